//! Shell commands sent to the traffic hosts.
//!
//! These are the only strings the harness sends over SSH. They assume a Linux
//! host with iperf3, NetworkManager and the `/qoe/wifi-reconnect.sh` helper
//! installed.

use crate::collector::CollectArgs;

/// Stop every traffic generator on the host.
pub const STOP_IPERF: &str = "/usr/bin/killall iperf3";

/// Force the wireless station to reassociate.
pub const WIFI_RECONNECT: &str = "/bin/bash /qoe/wifi-reconnect.sh";

/// Print the SSID the station is associated to.
pub const CURRENT_SSID: &str = "/sbin/iwgetid -r";

/// Client log suffix on the DUT side.
pub const DUT_CLIENT_LOG: &str = "iperf3_dut_st_wlan.log";

/// Client log suffix on the interferer side.
pub const INTERFERER_CLIENT_LOG: &str = "iperf3_int_st_wlan.log";

/// Associate to `ssid`.
#[must_use]
pub fn wifi_connect(ssid: &str, password: &str) -> String {
    format!("/usr/bin/nmcli dev wifi connect {ssid} password {password}")
}

/// Start an iperf3 server in the background.
#[must_use]
pub fn start_server(iperf: &str) -> String {
    format!("/usr/bin/nohup {iperf} -s  > /dev/null 2>&1 &")
}

/// Create `dir` unless it exists.
#[must_use]
pub fn ensure_dir(dir: &str) -> String {
    format!("/usr/bin/test -d {dir} || /bin/mkdir -p {dir}")
}

/// Start a UDP iperf3 client towards `target` at `rate_kbps` for `duration_secs`.
#[must_use]
pub fn start_client(
    iperf: &str,
    target: &str,
    duration_secs: u64,
    rate_kbps: u64,
    log_file: &str,
) -> String {
    format!(
        "/usr/bin/nohup {iperf} -c {target} -t {duration_secs} -u -i 1 --get-server-output -b {rate_kbps}K   > {log_file} 2>&1 &"
    )
}

/// Argument vector for the standalone collection entry point.
#[must_use]
pub fn collector_args(args: &CollectArgs) -> Vec<String> {
    vec![
        "--dut-bitrate".to_string(),
        args.dut_bitrate.to_string(),
        "--external-ap-load".to_string(),
        args.external_ap_load.to_string(),
        "--external-ap-channel".to_string(),
        args.external_ap_channel.to_string(),
        "--duration".to_string(),
        args.duration_secs.to_string(),
        "--period".to_string(),
        args.period_secs.to_string(),
        "--tolerance".to_string(),
        args.tolerance.to_string(),
        "--url".to_string(),
        args.url.clone(),
        "--output".to_string(),
        args.output.display().to_string(),
    ]
}
