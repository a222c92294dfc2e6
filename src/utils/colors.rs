/// ANSI color helper utilities for terminal output.
pub const RESET: &str = "\x1b[0m";

pub const GREY: &str = "\x1b[90m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";

pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const CYAN: &str = "\x1b[36m";
pub const MAGENTA: &str = "\x1b[35m";

/// Heat-map shades, index = intensity level (0 = no activity).
const INTENSITY_SHADES: [&str; 5] = [
    "\x1b[90m",
    "\x1b[38;5;151m",
    "\x1b[38;5;114m",
    "\x1b[38;5;70m",
    "\x1b[38;5;28m",
];

pub fn color_for_intensity(level: u8) -> &'static str {
    INTENSITY_SHADES[usize::from(level).min(INTENSITY_SHADES.len() - 1)]
}

/// Audit log operation color.
pub fn color_for_operation(op: &str) -> &'static str {
    match op {
        "session_start" | "project_add" | "idea_add" | "todo_add" => GREEN,
        "session_stop" | "todo_done" => BLUE,
        "session_del" | "project_del" => RED,
        "session_edit" | "project_edit" | "todo_edit" => YELLOW,
        "init" => CYAN,
        "migration_applied" => MAGENTA,
        _ => RESET,
    }
}

/// Running sessions are highlighted; ended ones stay plain.
pub fn color_for_session(running: bool) -> &'static str {
    if running { GREEN } else { RESET }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_is_clamped_to_the_palette() {
        assert_eq!(color_for_intensity(0), GREY);
        assert_eq!(color_for_intensity(200), color_for_intensity(4));
    }
}
