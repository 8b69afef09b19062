//! `strip` subcommand: strip-wide switching, reset and meter settings.

use super::{
    Config, Result, StripAction, StripActionOutput, StripSelector, Transport, print_json,
    with_strip,
};

impl StripAction {
    fn name(self) -> &'static str {
        match self {
            StripAction::AllOn => "all-on",
            StripAction::AllOff => "all-off",
            StripAction::Reset => "reset",
            StripAction::Overload { .. } => "overload",
            StripAction::Mode { .. } => "mode",
            StripAction::CurrentRatio { .. } => "current-ratio",
            StripAction::CurrentOffset => "current-offset",
        }
    }
}

pub(super) fn apply<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    action: StripAction,
    json: bool,
) -> Result<Option<StripActionOutput>> {
    with_strip(transport, config, selector, json, |strip| {
        let value = match action {
            StripAction::AllOn => strip.all_on().map(|_| None)?,
            StripAction::AllOff => strip.all_off().map(|_| None)?,
            StripAction::Reset => strip.reset().map(|_| None)?,
            StripAction::Overload { value: Some(v) } => strip.set_overload(v).map(|_| Some(v))?,
            StripAction::Overload { value: None } => Some(strip.overload()?),
            StripAction::Mode { value: Some(v) } => strip.set_mode(v).map(|_| Some(v))?,
            StripAction::Mode { value: None } => Some(strip.mode()?),
            StripAction::CurrentRatio { value } => {
                strip.set_current_ratio(value).map(|_| Some(value))?
            }
            StripAction::CurrentOffset => strip.set_current_offset().map(|_| None)?,
        };
        Ok(StripActionOutput {
            strip: strip.to_string(),
            action: action.name(),
            value,
        })
    })
}

pub(super) fn cmd_strip<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    action: StripAction,
    json: bool,
) -> Result<()> {
    let Some(out) = apply(transport, config, selector, action, json)? else {
        return Ok(());
    };

    if json {
        return print_json(&out);
    }

    match (action, out.value) {
        (StripAction::Overload { value: None }, Some(v)) => {
            println!("{}: overload {v}", out.strip)
        }
        (StripAction::Mode { value: None }, Some(v)) => println!("{}: mode {v}", out.strip),
        (_, Some(v)) => println!("{}: {} set to {v}", out.strip, out.action),
        (_, None) => println!("{}: {} done", out.strip, out.action),
    }
    Ok(())
}
