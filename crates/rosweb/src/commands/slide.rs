//! `rosweb slide`: drive one actuator from a slider value.

use rosweb_core::{MotionSettings, OutboundCommand};

use crate::cli::{GlobalOpts, SlideArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: &SlideArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let motion = apply_overrides(resolved.motion.clone(), args)?;

    // Out-of-range values fail here, before any connection is opened.
    let command = motion.encode(args.value)?;

    if args.dry_run {
        let payload = command.to_payload()?;
        output::print_output(&output::render_json(&payload, false), global.quiet);
        return Ok(());
    }

    let session = super::connect(resolved).await?;
    let sent = session.slider(&motion).and_then(|slider| slider.set(args.value));
    super::finish(&session).await;
    let sent = sent?;

    output::print_output(&summary(&motion, &sent), global.quiet);
    Ok(())
}

fn apply_overrides(
    mut motion: MotionSettings,
    args: &SlideArgs,
) -> Result<MotionSettings, CliError> {
    if let Some(actuator) = args.actuator {
        motion.actuator_id = actuator;
    }
    if let Some(scale) = args.scale {
        if !scale.is_finite() {
            return Err(CliError::Validation {
                field: "scale".into(),
                reason: "must be a finite number".into(),
            });
        }
        motion.scale_factor = scale;
    }
    if let Some(duration) = args.duration {
        motion.duration_ms = duration;
    }
    Ok(motion)
}

fn summary(motion: &MotionSettings, command: &OutboundCommand) -> String {
    format!(
        "actuator {} -> position {} over {}ms ({})",
        command.actuator_id, command.position, command.duration_ms, motion.topic
    )
}
