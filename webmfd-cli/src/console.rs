//! Terminal rendering of panels and parsing of typed button presses

use std::sync::Mutex;

use webmfd_core::protocol::{KEYS_PER_SIDE, SOFT_KEY_COUNT};
use webmfd_core::{ButtonEvent, PanelWidget};

/// A panel drawn as two rows of soft-key captions
pub struct ConsolePanel {
    number: usize,
    labels: Mutex<Vec<String>>,
}

impl ConsolePanel {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            labels: Mutex::new(vec![String::new(); SOFT_KEY_COUNT]),
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    /// Current captions, left column first
    pub fn labels(&self) -> Vec<String> {
        self.labels
            .lock()
            .map(|labels| labels.clone())
            .unwrap_or_default()
    }

    pub fn render(&self) -> String {
        let labels = self.labels();
        let row = |side: &str, captions: &[String]| {
            let cells: Vec<String> = captions
                .iter()
                .enumerate()
                .map(|(i, text)| format!("{}{}:{:<6}", side, i + 1, text))
                .collect();
            cells.join(" ")
        };
        format!(
            "[panel {}] {}\n{:width$}{}",
            self.number,
            row("L", &labels[..KEYS_PER_SIDE]),
            "",
            row("R", &labels[KEYS_PER_SIDE..]),
            width = format!("[panel {}] ", self.number).len(),
        )
    }
}

impl PanelWidget for ConsolePanel {
    fn set_button_label(&self, slot: usize, text: &str) {
        let Ok(mut labels) = self.labels.lock() else {
            return;
        };
        if let Some(label) = labels.get_mut(slot) {
            *label = text.to_string();
        }
        drop(labels);

        // Label sets are applied slot by slot, ending with the last right key
        if slot == SOFT_KEY_COUNT - 1 {
            println!("{}", self.render());
        }
    }

    fn notify_error(&self, message: &str) {
        eprintln!("[panel {}] error: {}", self.number, message);
    }
}

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Press `event` on the panel numbered `panel` (1-based)
    Press { panel: usize, event: ButtonEvent },
    /// Redraw every panel
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  [panel] <button>   press a button on a panel (default panel 1)
                     buttons: l1-l6 r1-r6 sel mnu pwr, or a numeric code
  show               redraw all panels
  help               this text
  quit               close every panel and exit";

/// Parse a prompt line; `panels` is the number of open panels
pub fn parse_command(line: &str, panels: usize) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Err("empty command".to_string()),
        ["show"] => Ok(Command::Show),
        ["help"] | ["?"] => Ok(Command::Help),
        ["quit"] | ["exit"] | ["q"] => Ok(Command::Quit),
        [button] => parse_press("1", button, panels),
        [panel, button] => parse_press(panel, button, panels),
        _ => Err(format!("unrecognised command '{}'", line.trim())),
    }
}

fn parse_press(panel: &str, button: &str, panels: usize) -> Result<Command, String> {
    let panel: usize = panel
        .parse()
        .map_err(|_| format!("'{}' is not a panel number", panel))?;
    if panel == 0 || panel > panels {
        return Err(format!("no panel {} (1-{} open)", panel, panels));
    }
    let event: ButtonEvent = button.parse().map_err(|e| format!("{}", e))?;
    Ok(Command::Press { panel, event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use webmfd_core::Side;

    #[test]
    fn test_button_alone_targets_first_panel() {
        assert_eq!(
            parse_command("sel", 2),
            Ok(Command::Press {
                panel: 1,
                event: ButtonEvent::Select
            })
        );
    }

    #[test]
    fn test_panel_and_soft_key() {
        assert_eq!(
            parse_command("2 r3", 2),
            Ok(Command::Press {
                panel: 2,
                event: ButtonEvent::SoftKey {
                    side: Side::Right,
                    index: 2
                }
            })
        );
    }

    #[test]
    fn test_numeric_code() {
        assert_eq!(
            parse_command("1 14", 1),
            Ok(Command::Press {
                panel: 1,
                event: ButtonEvent::Menu
            })
        );
    }

    #[test]
    fn test_panel_out_of_range() {
        assert!(parse_command("3 sel", 2).is_err());
        assert!(parse_command("0 sel", 2).is_err());
    }

    #[test]
    fn test_unknown_button() {
        assert!(parse_command("1 l7", 1).is_err());
        assert!(parse_command("bogus", 1).is_err());
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse_command("show", 1), Ok(Command::Show));
        assert_eq!(parse_command("  quit ", 1), Ok(Command::Quit));
        assert_eq!(parse_command("help", 1), Ok(Command::Help));
        assert!(parse_command("", 1).is_err());
    }

    #[test]
    fn test_panel_records_labels() {
        let panel = ConsolePanel::new(1);
        panel.set_button_label(0, "NAV");
        panel.set_button_label(7, "HSI");
        panel.set_button_label(42, "ignored");

        let labels = panel.labels();
        assert_eq!(labels[0], "NAV");
        assert_eq!(labels[7], "HSI");
        assert_eq!(labels.len(), SOFT_KEY_COUNT);
    }

    #[test]
    fn test_render_lists_both_columns() {
        let panel = ConsolePanel::new(2);
        panel.set_button_label(0, "NAV");
        panel.set_button_label(6, "MFD");

        let rendered = panel.render();

        assert!(rendered.starts_with("[panel 2] L1:NAV"));
        assert!(rendered.contains("R1:MFD"));
        assert_eq!(rendered.lines().count(), 2);
    }
}
