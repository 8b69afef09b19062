//! `meter` subcommand: instantaneous current, cumulative energy, counter reset.

use super::{Config, MeterOutput, Result, StripSelector, Transport, print_json, with_strip};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Reading {
    Current,
    Cumulative,
    Reset,
}

pub(super) fn read_meter<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    reading: Reading,
    json: bool,
) -> Result<Option<MeterOutput>> {
    with_strip(transport, config, selector, json, |strip| {
        let mut out = MeterOutput {
            strip: strip.to_string(),
            current_ma: None,
            cumulative_kwh: None,
            counter_reset: false,
        };
        match reading {
            Reading::Current => out.current_ma = Some(strip.current_ma()?),
            Reading::Cumulative => out.cumulative_kwh = Some(strip.cumulative_kwh()?),
            Reading::Reset => {
                strip.reset_counter()?;
                out.counter_reset = true;
            }
        }
        Ok(out)
    })
}

pub(super) fn cmd_meter<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    reading: Reading,
    json: bool,
) -> Result<()> {
    let Some(out) = read_meter(transport, config, selector, reading, json)? else {
        return Ok(());
    };

    if json {
        return print_json(&out);
    }

    if let Some(ma) = out.current_ma {
        println!("{}: {ma} mA", out.strip);
    }
    if let Some(kwh) = out.cumulative_kwh {
        println!("{}: {kwh:.4} kWh", out.strip);
    }
    if out.counter_reset {
        println!("{}: energy counter reset", out.strip);
    }
    Ok(())
}
