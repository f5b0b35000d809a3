//! Console renderer for the headless dashboard.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use ouvidoria_core::{RenderError, RenderOptions, Renderer};

const DEFAULT_WIDTH: usize = 40;
const PALETTE: [char; 5] = ['#', '=', '*', '+', 'o'];

/// Draws charts as text bars into a writer.
///
/// Only the configured containers are considered present; renders into any
/// other container are skipped.
pub struct TextRenderer {
    containers: HashSet<String>,
    out: Mutex<Box<dyn Write + Send>>,
    width: usize,
}

impl TextRenderer {
    pub fn new<I, S>(containers: I, out: Box<dyn Write + Send>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: containers.into_iter().map(Into::into).collect(),
            out: Mutex::new(out),
            width: DEFAULT_WIDTH,
        }
    }

    pub fn stdout<I, S>(containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(containers, Box::new(std::io::stdout()))
    }

    /// Widest bar, in characters.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }
}

#[async_trait]
impl Renderer for TextRenderer {
    fn has_container(&self, container_id: &str) -> bool {
        self.containers.contains(container_id)
    }

    async fn render(
        &self,
        container_id: &str,
        labels: &[String],
        values: &[f64],
        options: &RenderOptions,
    ) -> Result<(), RenderError> {
        if !self.has_container(container_id) {
            return Err(RenderError::Skipped(container_id.to_string()));
        }
        if labels.len() != values.len() {
            return Err(RenderError::Failed {
                container: container_id.to_string(),
                reason: format!("{} labels for {} values", labels.len(), values.len()),
            });
        }

        let text = format_bars(container_id, labels, values, options, self.width);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|err| RenderError::Failed {
                container: container_id.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Text for one chart: a header line, then one bar per label scaled to the
/// largest value.
pub fn format_bars(
    container_id: &str,
    labels: &[String],
    values: &[f64],
    options: &RenderOptions,
    width: usize,
) -> String {
    let mut text = String::new();
    let _ = write!(text, "[{}]", container_id);
    if let Some(dimension) = &options.clickable_dimension {
        let _ = write!(text, " by {}", dimension);
    }
    text.push('\n');

    if labels.is_empty() {
        text.push_str("  (no data)\n");
        return text;
    }

    let max = values.iter().copied().fold(0.0_f64, f64::max);
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let mark = PALETTE[options.color_index % PALETTE.len()];

    for (label, value) in labels.iter().zip(values) {
        let len = if max > 0.0 {
            ((value / max) * width as f64).round() as usize
        } else {
            0
        };
        let bar: String = std::iter::repeat(mark).take(len).collect();
        let padding = label_width - label.chars().count();
        let _ = writeln!(
            text,
            "  {}{} | {} {}",
            label,
            " ".repeat(padding),
            bar,
            format_value(*value)
        );
    }
    text
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bars_scale_to_max() {
        let text = format_bars(
            "chartCanal",
            &labels(&["Telefone", "E-mail"]),
            &[10.0, 5.0],
            &RenderOptions::default().clickable("Canal"),
            10,
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[chartCanal] by Canal");
        assert_eq!(lines[1], "  Telefone | ########## 10");
        assert_eq!(lines[2], "  E-mail   | ##### 5");
    }

    #[test]
    fn test_empty_series() {
        let text = format_bars("chartTipo", &[], &[], &RenderOptions::default(), 10);
        assert_eq!(text, "[chartTipo]\n  (no data)\n");
    }

    #[test]
    fn test_fractional_values_and_palette() {
        let text = format_bars(
            "stats",
            &labels(&["tempoMedioResolucao"]),
            &[3.5],
            &RenderOptions::default().color_index(1),
            4,
        );
        assert!(text.contains("==== 3.50"));
    }

    #[tokio::test]
    async fn test_render_writes_only_present_containers() {
        let buf = SharedBuf::default();
        let renderer = TextRenderer::new(["chartCanal"], Box::new(buf.clone())).with_width(4);

        renderer
            .render("chartCanal", &labels(&["Telefone"]), &[2.0], &RenderOptions::default())
            .await
            .unwrap();
        let err = renderer
            .render("chartTipo", &labels(&["Elogio"]), &[1.0], &RenderOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_skipped());

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("[chartCanal]\n"));
        assert!(!written.contains("chartTipo"));
    }

    #[tokio::test]
    async fn test_mismatched_lengths_fail() {
        let renderer = TextRenderer::new(["c"], Box::new(SharedBuf::default()));
        let err = renderer
            .render("c", &labels(&["a", "b"]), &[1.0], &RenderOptions::default())
            .await
            .unwrap_err();
        assert!(!err.is_skipped());
    }
}
