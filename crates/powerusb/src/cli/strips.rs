//! `strips` subcommand: list connected strips with a one-line health check.

use super::{
    Config, Result, Strip, StripDetailsJson, StripSummaryJson, StripsOutput, Transport,
    list_strips_with, print_json, report_no_strips,
};

fn details<T: Transport>(strip: &Strip<T>) -> Result<StripDetailsJson> {
    let session = strip.open()?;
    let sockets = session
        .sockets()
        .iter()
        .map(|s| s.power())
        .collect::<Result<Vec<_>>>()?;
    Ok(StripDetailsJson {
        manufacturer: session.manufacturer(),
        product: session.product(),
        model: session.model()?.to_string(),
        firmware: session.firmware_version()?.to_string(),
        current_ma: session.current_ma()?,
        sockets,
    })
}

/// Query every strip. A strip that fails is reported, not fatal.
pub(super) fn collect<T: Transport>(strips: &[Strip<T>]) -> StripsOutput {
    let strips: Vec<StripSummaryJson> = strips
        .iter()
        .enumerate()
        .map(|(i, strip)| {
            let (details, error) = match details(strip) {
                Ok(d) => (Some(d), None),
                Err(e) => {
                    log::debug!("{e}");
                    (None, Some(e.to_string()))
                }
            };
            StripSummaryJson {
                index: i + 1,
                path: strip.path(),
                serial: strip.serial().map(str::to_string),
                label: strip.label().map(str::to_string),
                details,
                error,
            }
        })
        .collect();
    StripsOutput {
        count: strips.len(),
        strips,
    }
}

pub(super) fn cmd_strips<T: Transport>(transport: &T, config: &Config, json: bool) -> Result<()> {
    let strips = list_strips_with(transport, config)?;
    let output = collect(&strips);

    if output.count == 0 {
        report_no_strips(json);
    }
    if json {
        return print_json(&output);
    }
    if output.count == 0 {
        return Ok(());
    }

    println!(
        "Found {} PowerUSB strip{}:",
        output.count,
        if output.count == 1 { "" } else { "s" }
    );
    println!();

    for (strip, summary) in strips.iter().zip(&output.strips) {
        println!("  [{}] {strip}", summary.index);
        if let Some(ref serial) = summary.serial {
            println!("      Serial:   {serial}");
        }
        match (&summary.details, &summary.error) {
            (Some(d), _) => {
                println!("      Model:    {} (firmware {})", d.model, d.firmware);
                println!("      Current:  {} mA", d.current_ma);
                let states: Vec<String> = d.sockets.iter().map(ToString::to_string).collect();
                println!("      Sockets:  {}", states.join(" "));
            }
            (None, Some(e)) => println!("      Error:    {e}"),
            (None, None) => {}
        }
    }

    Ok(())
}
