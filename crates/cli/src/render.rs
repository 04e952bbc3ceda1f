use std::time::Duration;

use console::{measure_text_width, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Column-aligned text table. Cells may carry ANSI styling; widths are
/// measured on the visible text.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    right_aligned: Vec<bool>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        Self {
            right_aligned: vec![false; headers.len()],
            headers,
            rows: Vec::new(),
        }
    }

    pub fn align_right(mut self, column: usize) -> Self {
        if let Some(flag) = self.right_aligned.get_mut(column) {
            *flag = true;
        }
        self
    }

    /// Short rows are padded with empty cells, extra cells are dropped
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|col| {
                self.rows
                    .iter()
                    .map(|row| measure_text_width(&row[col]))
                    .chain(std::iter::once(measure_text_width(&self.headers[col])))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let header: Vec<String> = self
            .headers
            .iter()
            .map(|h| style(h).cyan().bold().to_string())
            .collect();
        self.push_line(&mut out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
        self.push_line(&mut out, &rule, &widths);
        for row in &self.rows {
            self.push_line(&mut out, row, &widths);
        }
        out
    }

    fn push_line(&self, out: &mut String, cells: &[String], widths: &[usize]) {
        let last = cells.len().saturating_sub(1);
        let mut line = String::new();
        for (col, cell) in cells.iter().enumerate() {
            let pad = widths[col].saturating_sub(measure_text_width(cell));
            if self.right_aligned[col] {
                line.push_str(&" ".repeat(pad));
                line.push_str(cell);
            } else {
                line.push_str(cell);
                if col != last {
                    line.push_str(&" ".repeat(pad));
                }
            }
            if col != last {
                line.push_str("  ");
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

/// Spinner on stderr while a slow fetch runs; invisible when stderr is not
/// a terminal
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Red `Error: ...` line on stderr
pub fn error_line(message: impl std::fmt::Display) {
    eprintln!("{}", style(format!("Error: {message}")).red().for_stderr());
}

/// Dim hint line on stderr, printed under an error
pub fn hint_line(message: impl std::fmt::Display) {
    eprintln!("{}", style(message).dim().for_stderr());
}
