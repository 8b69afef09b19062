//! `socket` subcommand: read or switch individual sockets.

use super::{
    Config, PowerState, Result, SocketOutput, SocketSpec, Transport, list_strips_with, print_json,
    report_no_strips,
};

/// Apply `set` (or read, if `None`) to each socket in order. Every selector
/// is resolved before the first socket is touched. Each socket gets its own
/// session; the first device failure stops the run.
pub(super) fn apply<T: Transport>(
    transport: &T,
    config: &Config,
    specs: &[SocketSpec],
    set: Option<PowerState>,
    default: bool,
    json: bool,
) -> Result<Option<Vec<SocketOutput>>> {
    let strips = list_strips_with(transport, config)?;
    if strips.is_empty() {
        report_no_strips(json);
        return Ok(None);
    }

    let targets = specs
        .iter()
        .map(|spec| -> Result<_> { Ok((spec.strip.resolve(&strips)?, spec.socket)) })
        .collect::<Result<Vec<_>>>()?;

    let mut results = Vec::with_capacity(targets.len());
    for (strip, index) in targets {
        let session = strip.open()?;
        let socket = session.socket_at(index);
        let state = match (set, default) {
            (Some(state), false) => {
                socket.set_power(state)?;
                state
            }
            (Some(state), true) => {
                socket.set_default_power(state)?;
                state
            }
            (None, false) => socket.power()?,
            (None, true) => socket.default_power()?,
        };
        session.close()?;

        results.push(SocketOutput {
            strip: strip.to_string(),
            socket: index.get(),
            target: if default { "default" } else { "live" },
            state,
            changed: set.is_some(),
        });
    }
    Ok(Some(results))
}

pub(super) fn cmd_socket<T: Transport>(
    transport: &T,
    config: &Config,
    specs: &[SocketSpec],
    set: Option<PowerState>,
    default: bool,
    json: bool,
) -> Result<()> {
    let Some(results) = apply(transport, config, specs, set, default, json)? else {
        return Ok(());
    };

    if json {
        return print_json(&results);
    }

    for r in &results {
        let what = if default { " default" } else { "" };
        let arrow = if r.changed { "->" } else { "is" };
        println!("{} socket {}{what} {arrow} {}", r.strip, r.socket, r.state);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerusb_lib::transport::mock::{MockTransport, strip_info};

    fn specs(list: &[&str]) -> Vec<SocketSpec> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn switches_sockets_across_strips() {
        let t = MockTransport::new();
        let a = t.add_device(strip_info("1", 4, Some("A")));
        let b = t.add_device(strip_info("1", 5, Some("B")));

        let results = apply(
            &t,
            &Config::default(),
            &specs(&["A:1", "B:3", "1:4:2"]),
            Some(PowerState::On),
            false,
            false,
        )
        .unwrap()
        .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.changed && r.target == "live"));
        assert_eq!(a.power.get(), [true, true, false]);
        assert_eq!(b.power.get(), [false, false, true]);
        assert_eq!(a.opens.get(), 2);
        assert!(!a.claimed.get() && !b.claimed.get());
    }

    #[test]
    fn default_flag_targets_power_on_state() {
        let t = MockTransport::new();
        let fw = t.add_strip("1", 4);
        fw.power.set([true, true, true]);

        apply(
            &t,
            &Config::default(),
            &specs(&["1:2"]),
            Some(PowerState::Off),
            true,
            false,
        )
        .unwrap();
        assert_eq!(fw.power.get(), [true, true, true]);
        assert_eq!(fw.defaults.get(), [false, false, false]);

        apply(
            &t,
            &Config::default(),
            &specs(&["1:2"]),
            Some(PowerState::On),
            true,
            false,
        )
        .unwrap();
        assert_eq!(fw.defaults.get(), [false, true, false]);
    }

    #[test]
    fn read_without_flags_reports_state() {
        let t = MockTransport::new();
        let fw = t.add_strip("1", 4);
        fw.power.set([false, false, true]);
        fw.defaults.set([true, false, false]);

        let live = apply(&t, &Config::default(), &specs(&["1:3"]), None, false, true)
            .unwrap()
            .unwrap();
        assert_eq!(live[0].state, PowerState::On);
        assert!(!live[0].changed);

        let default = apply(&t, &Config::default(), &specs(&["1:1"]), None, true, true)
            .unwrap()
            .unwrap();
        assert_eq!(default[0].state, PowerState::On);
        assert_eq!(default[0].target, "default");
    }

    #[test]
    fn unknown_strip_stops_before_switching() {
        let t = MockTransport::new();
        let fw = t.add_strip("1", 4);
        let err = apply(
            &t,
            &Config::default(),
            &specs(&["nowhere:1", "1:1"]),
            Some(PowerState::On),
            false,
            false,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("nowhere"));
        assert!(fw.frames.borrow().is_empty());
    }

    #[test]
    fn later_unknown_strip_switches_nothing() {
        let t = MockTransport::new();
        let fw = t.add_strip("1", 4);
        let result = apply(
            &t,
            &Config::default(),
            &specs(&["1:1", "nowhere:2"]),
            Some(PowerState::On),
            false,
            false,
        );
        assert!(result.is_err());
        assert_eq!(fw.power.get(), [false; 3]);
        assert!(fw.frames.borrow().is_empty());
        assert_eq!(fw.opens.get(), 0);
    }

    #[test]
    fn cmd_socket_without_strips_succeeds() {
        let t = MockTransport::new();
        let result = cmd_socket(
            &t,
            &Config::default(),
            &specs(&["1:1"]),
            Some(PowerState::On),
            false,
            false,
        );
        assert!(result.is_ok());
    }
}
