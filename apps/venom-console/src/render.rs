use chrono::{DateTime, Local};
use venom_link::{ConnectionState, HistoryLog, SystemState};

pub fn timestamp(at: DateTime<Local>) -> String {
    at.format("[%H:%M:%S]").to_string()
}

pub fn state_line(at: DateTime<Local>, state: &SystemState) -> String {
    let detail = if state.detail.is_empty() {
        "-"
    } else {
        state.detail.as_str()
    };
    format!(
        "{} {:<10} cpu {:>5.1}% ram {:>5.1}% neural {:>5.1}  {}",
        timestamp(at),
        state.status.as_str(),
        state.vitals.cpu_percent,
        state.vitals.ram_percent,
        state.vitals.neural_activity,
        detail
    )
}

/// Link status is shown next to, never instead of, the backend's status.
pub fn link_line(at: DateTime<Local>, connection: ConnectionState) -> String {
    let note = match connection {
        ConnectionState::Connected => "neural link established",
        ConnectionState::Connecting => "establishing neural link",
        ConnectionState::ReconnectScheduled => "neural link severed; reconnecting",
        ConnectionState::Disconnected => "neural link closed",
    };
    format!("{} link:{} {}", timestamp(at), connection, note)
}

pub fn history_block(history: &HistoryLog) -> String {
    if history.is_empty() {
        return "no recorded activity".to_string();
    }
    history
        .iter()
        .enumerate()
        .map(|(index, detail)| format!("{:>2}. {}", index + 1, detail))
        .collect::<Vec<_>>()
        .join("\n")
}
