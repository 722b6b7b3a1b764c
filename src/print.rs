//! ## Printing Module
//!
//! This module is only here to make logging in the terminal easier to read.
//! It allows to print in appropriate colors depending on the situation.
//! It also provides a nice print-format for the [GlobalState].
use crate::config;
use crate::world_view::{Dirn, ElevatorBehaviour, GlobalState};
use ansi_term::Colour::{self, Green, Red, Yellow, Purple, White};

use std::sync::Mutex;
use unicode_width::UnicodeWidthStr;

/// Reads one of the print toggles in [config]. A poisoned toggle counts as enabled.
fn enabled(flag: &Mutex<bool>) -> bool {
    flag.lock().map(|on| *on).unwrap_or(true)
}

/// Prints an error message in red to the terminal.
///
/// If `PRINT_ERR_ON` is `false`, the message will not be printed.
///
/// ## Parameters
/// - `msg`: The error message to print.
///
/// ## Terminal output
/// - "\[ERROR\]:   {}", msg
///
/// ## Example
/// ```
/// use elevatorsync::print;
///
/// print::err("Something went wrong!".to_string());
/// ```
pub fn err(msg: String) {
    if enabled(&config::PRINT_ERR_ON) {
        println!("{}{}\n", Red.paint("[ERROR]:   "), Red.paint(msg));
    }
}

/// Prints a warning message in yellow to the terminal.
///
/// If `PRINT_WARN_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[WARNING\]: {}", msg
pub fn warn(msg: String) {
    if enabled(&config::PRINT_WARN_ON) {
        println!("{}{}\n", Yellow.paint("[WARNING]: "), Yellow.paint(msg));
    }
}

/// Prints a success message in green to the terminal.
///
/// If `PRINT_OK_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[OK\]:      {}", msg
pub fn ok(msg: String) {
    if enabled(&config::PRINT_OK_ON) {
        println!("{}{}\n", Green.paint("[OK]:      "), Green.paint(msg));
    }
}

/// Prints an informational message in light blue to the terminal.
///
/// If `PRINT_INFO_ON` is `false`, the message will not be printed.
///
/// ## Terminal output
/// - "\[INFO\]:    {}", msg
pub fn info(msg: String) {
    let light_blue = Colour::RGB(102, 178, 255);
    if enabled(&config::PRINT_INFO_ON) {
        println!("{}{}\n", light_blue.paint("[INFO]:    "), light_blue.paint(msg));
    }
}

/// Prints a debug message in grey. Off by default, turned on with `print_debug::true`.
///
/// Used for expected noise, like datagrams from unrelated senders on the broadcast port.
///
/// ## Terminal output
/// - "\[DEBUG\]:   {}", msg
pub fn debug(msg: String) {
    let grey = Colour::RGB(140, 140, 140);
    if enabled(&config::PRINT_DEBUG_ON) {
        println!("{}{}\n", grey.paint("[DEBUG]:   "), grey.paint(msg));
    }
}

/// Pads the input text to a fixed display width using spaces.
///
/// Accounts for characters that may take more than one column width (e.g. Unicode symbols),
/// ensuring aligned text in terminal-based tables.
fn pad_text(text: &str, width: usize) -> String {
    let visible_width = UnicodeWidthStr::width(text);
    let padding = width.saturating_sub(visible_width);
    format!("{}{}", text, " ".repeat(padding))
}

fn request_symbol(active: bool) -> &'static str {
    if active { "🟢" } else { "🔴" }
}

/// Logs a [GlobalState] to the terminal as a colorized table.
///
/// Shows the origin of the snapshot, the hall request matrix (top floor first),
/// and one row per known node with floor, direction, behaviour and cab requests.
///
/// # Behavior
/// - If `config::PRINT_STATE_ON` is false, the function exits early.
///
/// # Notes
/// - Printing frequency should be limited (e.g., once per 500 ms).
pub fn global_state(state: &GlobalState) {
    if !enabled(&config::PRINT_STATE_ON) {
        return;
    }

    println!("{}", Purple.bold().paint("┌────────────────────────────────┐"));
    println!("{}", Purple.bold().paint("│       GLOBAL STATE STATUS      │"));
    println!("{}", Purple.bold().paint("└────────────────────────────────┘"));
    println!("Origin: {}   Nodes: {}", state.origin_id, state.nodes.len());

    println!("┌────────────┬──────────────────────┐");
    println!("{}", White.bold().paint("│ Floor      │ Hall requests        │"));
    println!("├────────────┼──────────────────────┤");
    for (floor, buttons) in state.hall_requests.iter().enumerate().rev() {
        let row: Vec<&str> = buttons.iter().map(|b| request_symbol(*b)).collect();
        println!("│ {} │ {} │", pad_text(&floor.to_string(), 10), pad_text(&row.join(" "), 20));
    }
    println!("└────────────┴──────────────────────┘");

    // Sorter på id så tabellen ikkje hoppar rundt mellom utskrifter
    let mut ids: Vec<&String> = state.nodes.keys().collect();
    ids.sort();

    println!("┌──────────────────┬───────┬──────────────┬──────────────────────┐");
    println!("{}", White.bold().paint("│ ID               │ Floor │ Status       │ Cab requests         │"));
    println!("├──────────────────┼───────┼──────────────┼──────────────────────┤");
    for id in ids {
        let node = &state.nodes[id];
        let status = match (node.direction, node.behaviour) {
            (_, ElevatorBehaviour::Idle) => Green.paint(pad_text("Idle", 12)),
            (Dirn::Up, ElevatorBehaviour::Moving) => Yellow.paint(pad_text("Moving up", 12)),
            (Dirn::Down, ElevatorBehaviour::Moving) => Yellow.paint(pad_text("Moving down", 12)),
            (Dirn::Idle, ElevatorBehaviour::Moving) => Red.paint(pad_text("Not moving", 12)),
            (_, ElevatorBehaviour::DoorOpen) => Purple.paint(pad_text("Door open", 12)),
        };
        let cabs: Vec<&str> = node.cab_requests.iter().map(|c| request_symbol(*c)).collect();
        println!(
            "│ {} │ {:>5} │ {} │ {} │",
            pad_text(id, 16),
            node.floor,
            status,
            pad_text(&cabs.join(""), 20)
        );
    }
    println!("└──────────────────┴───────┴──────────────┴──────────────────────┘");
}
