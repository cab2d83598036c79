use crate::error::{Result, StreamerError};
use serde::{Deserialize, Serialize};

const GRAB_ARGS: [&str; 2] = ["--start-fullscreen", "--disable-infobars"];
const GRAB_IGNORED_DEFAULT_ARGS: [&str; 1] = ["--mute-audio"];

/// Which of the browser's default launch arguments to drop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreDefaultArgs {
    All(bool),
    List(Vec<String>),
}

impl Default for IgnoreDefaultArgs {
    fn default() -> Self {
        IgnoreDefaultArgs::List(Vec::new())
    }
}

/// Browser launch options handed to the automation controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub ignore_default_args: IgnoreDefaultArgs,
}

/// Adjust launch options so the browser window can be grabbed from the
/// display: headful, fullscreen, no infobar, audio left unmuted.
///
/// Fails when the caller explicitly asked for a headless browser, since
/// there would be no window to grab.
pub fn ensure_required_grab_args(options: LaunchOptions) -> Result<LaunchOptions> {
    if options.headless == Some(true) {
        return Err(StreamerError::config(
            "continuous grab requires a headful browser",
        ));
    }

    let mut args = options.args;
    args.extend(GRAB_ARGS.iter().map(|arg| arg.to_string()));

    let ignored = GRAB_IGNORED_DEFAULT_ARGS.iter().map(|arg| arg.to_string());
    let ignore_default_args = match options.ignore_default_args {
        IgnoreDefaultArgs::All(true) => IgnoreDefaultArgs::All(true),
        IgnoreDefaultArgs::All(false) => IgnoreDefaultArgs::List(ignored.collect()),
        IgnoreDefaultArgs::List(mut list) => {
            list.extend(ignored);
            IgnoreDefaultArgs::List(list)
        }
    };

    Ok(LaunchOptions {
        headless: Some(false),
        args,
        ignore_default_args,
    })
}
