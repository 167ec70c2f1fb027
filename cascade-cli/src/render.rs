use std::fmt::Write;
use std::time::SystemTime;

use cascade_core::chain::ChainDefinition;
use cascade_core::reducer::{ChainEvent, EventEnvelope};
use cascade_core::state::{ChainState, OptionsState};
use cascade_core::validation::ValidationGate;

/// Format a SystemTime as HH:MM:SS
fn format_timestamp(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            let hours = (secs / 3600) % 24;
            let minutes = (secs / 60) % 60;
            let seconds = secs % 60;
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn options_summary(options: &OptionsState) -> String {
    match options {
        OptionsState::Ready(list) => format!("{} option(s)", list.len()),
        OptionsState::Error(message) => format!("error: {}", message),
        other => other.label().to_string(),
    }
}

/// One line per level, indented under its parent
pub fn state_table(definition: &ChainDefinition, state: &ChainState) -> String {
    let width = definition
        .order()
        .iter()
        .map(|id| id.len() + 2 * definition.ancestors(id).len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for level in definition.levels() {
        let Some(s) = state.get(&level.id) else {
            continue;
        };
        let name = format!(
            "{}{}",
            "  ".repeat(definition.ancestors(&level.id).len()),
            level.id
        );
        let value = match s.selected_option() {
            Some(o) if o.label != o.value => format!("{} ({})", o.value, o.label),
            Some(o) => o.value.clone(),
            None => "-".to_string(),
        };
        let optional = if level.required { "" } else { " [optional]" };
        let _ = writeln!(
            out,
            "  {:<width$}  {:<24} {}{}",
            name,
            value,
            options_summary(&s.options),
            optional,
            width = width
        );
    }
    out
}

pub fn gate_summary(gate: &ValidationGate<'_>) -> String {
    let mut out = String::new();
    if gate.is_complete() {
        out.push_str("complete: yes\n");
        return out;
    }
    let _ = writeln!(out, "complete: no (waiting on {})", gate.blocking().join(", "));
    for (level, error) in gate.errors() {
        let _ = writeln!(out, "  {}: {}", level, error);
    }
    out
}

pub fn event_line(env: &EventEnvelope) -> String {
    let text = match &env.event {
        ChainEvent::Seeded { mode } => format!("seeded ({} form)", mode),
        ChainEvent::OptionsLoading { level, generation } => {
            format!("{} loading (gen {})", level, generation)
        }
        ChainEvent::OptionsIdle { level, .. } => format!("{} cleared", level),
        ChainEvent::OptionsReady {
            level, options, ..
        } => format!("{} ready: {} option(s)", level, options.len()),
        ChainEvent::FetchFailed { level, message, .. } => {
            format!("{} failed: {}", level, message)
        }
        ChainEvent::Selected {
            level,
            value,
            origin,
        } => format!(
            "{} = {} ({:?})",
            level,
            value.as_deref().unwrap_or("-"),
            origin
        ),
        ChainEvent::Touched { level } => format!("{} touched", level),
        ChainEvent::StaleDiscarded { level, generation } => {
            format!("{} discarded superseded result (gen {})", level, generation)
        }
    };
    format!("[{}] #{} {}", format_timestamp(env.at), env.id, text)
}
