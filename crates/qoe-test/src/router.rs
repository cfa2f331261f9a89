//! Router console scripts.
//!
//! The routers expose a CLI on their serial console. Getting to a usable prompt
//! means backing out of any open menu and logging in; the login line packs
//! user, password and confirmation separated by bare CRs, and is repeated
//! because the console swallows input while it is still booting.

const LOGIN: &str = "admin\radmin\radmin";

/// CWMP parameter holding the interferer's 2.4 GHz channel.
pub const INTERFERER_CHANNEL_PARAM: &str =
    "InternetGatewayDevice.LANDevice.5.WLANConfiguration.9.Channel";

fn preamble() -> Vec<String> {
    let mut cmds = vec!["exit".to_string(); 3];
    cmds.extend(std::iter::repeat_n(LOGIN.to_string(), 4));
    cmds
}

/// Log in and reboot.
#[must_use]
pub fn reboot_script() -> Vec<String> {
    let mut cmds = preamble();
    cmds.push("system reboot".to_string());
    cmds
}

/// Log in and set the interferer's 2.4 GHz channel.
#[must_use]
pub fn set_channel_script(channel: u32) -> Vec<String> {
    let mut cmds = preamble();
    cmds.push(format!("cwmp set_params {INTERFERER_CHANNEL_PARAM} {channel}"));
    cmds
}
