//! VMS billboard codec
//!
//! Text protocol: a control header (`load`/`init`/`page-with-wait`), one line
//! directive per non-empty message line, then end/save directives. Font size
//! is chosen from the total line count so the message fills the panel; the
//! whole frame is transcoded to the sign's native EUC-KR charset.

use super::charset::to_euc_kr;
use crate::error::Result;

/// Fixed billboard color palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineColor {
    #[default]
    Default,
    Red,
    Green,
    Yellow,
}

impl LineColor {
    /// Wire code for the `Cr` directive
    pub fn code(&self) -> u8 {
        match self {
            LineColor::Default => 0,
            LineColor::Red => 1,
            LineColor::Green => 2,
            LineColor::Yellow => 3,
        }
    }
}

/// Page display mode; `dwell` is the page hold time in the `pWait` directive
#[derive(Debug, Clone, Copy)]
pub struct PageMode {
    pub dwell: u8,
}

impl Default for PageMode {
    fn default() -> Self {
        Self { dwell: 30 }
    }
}

/// Font dimensions selected from the number of displayed lines
fn font_for(line_count: usize) -> (u8, u8) {
    match line_count {
        0..=2 => (16, 32),
        3..=4 => (8, 16),
        _ => (6, 12),
    }
}

/// Encode a multi-line message for a VMS billboard
///
/// `colors` is indexed by displayed line; missing entries fall back to the
/// default color. Empty lines are skipped and do not consume a color slot.
pub fn encode(message: &str, colors: &[LineColor], mode: PageMode) -> Result<Vec<u8>> {
    let lines: Vec<&str> = message
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();

    let (width, height) = font_for(lines.len());

    let mut frame = String::new();
    frame.push_str("[SnrLoad]\r");
    frame.push_str("[SnrInit]\r");
    frame.push_str(&format!("[Page999 pWait 0,{}]\r", mode.dwell));

    for (idx, line) in lines.iter().enumerate() {
        let color = colors.get(idx).copied().unwrap_or_default();
        frame.push_str(&format!(
            "[Ln{} Align0 Yp{} Xp0][Fw{} Fh{} Ft1 Cr{}]{}\r",
            idx,
            idx * height as usize,
            width,
            height,
            color.code(),
            line
        ));
    }

    frame.push_str("[SnrEnd]\r");
    frame.push_str("[SnrSave]\r");

    to_euc_kr(&frame)
}
