//! Randomized-but-bounded TCP/IP tuning parameters handed to each newly
//! registered instance, ported from `generate_sys_net_opts`.

use rand::Rng;

fn buf_settings(prefix: &str, rng: &mut impl Rng) -> Vec<String> {
    let bufauto: u8 = rng.random_range(0..=1);
    let bufspace = rng.random_range(0x1..=0x40) * 0x1000;
    let bufinc = rng.random_range(bufspace / 4 / 0x800..bufspace / 2 / 0x800).max(1) * 0x800;
    let bufmax = rng.random_range(bufspace / 0x1000..bufspace * 4 / 0x1000).max(bufspace / 0x1000) * 0x1000;
    debug_assert!(bufmax >= bufspace, "nonsensical space vs max values");

    vec![
        format!("{prefix}buf_auto:{bufauto}"),
        format!("{prefix}space:{bufspace:x}"),
        format!("{prefix}buf_inc:{bufinc:x}"),
        format!("{prefix}buf_max:{bufmax:x}"),
    ]
}

/// Builds the space-separated `key:hexvalue` parameter string published to
/// an instance right after its address settles.
pub fn generate_sys_net_opts() -> String {
    let mut rng = rand::rng();
    let mut params = Vec::new();

    params.extend(buf_settings("send", &mut rng));
    params.extend(buf_settings("recv", &mut rng));

    params.push(format!("init_win:{:x}", rng.random_range(2..=6)));
    params.push(format!("init_win_local:{:x}", rng.random_range(2..=6)));
    params.push(format!("delack_ticks:{:x}", rng.random_range(10..=40)));

    let congctl = [ "reno", "newreno", "cubic" ][rng.random_range(0..3)];
    params.push(format!("congctl:{congctl}"));

    params.join(" ")
}
