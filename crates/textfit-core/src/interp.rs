//! # Classification interpretation
//!
//! Confusion matrix, most-confused pairs, and top losses over a set of
//! classifier predictions.

use std::fmt;

use crate::train::Preds;

/// Samples per slice when accumulating the confusion matrix.
pub const DEFAULT_SLICE_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClassificationInterpretation {
    classes: Vec<String>,
    preds: Preds,
    predicted: Vec<u32>,
    slice_size: usize,
}

impl ClassificationInterpretation {
    pub fn from_preds(classes: Vec<String>, preds: Preds) -> Self {
        let predicted = preds.predicted();
        Self {
            classes,
            preds,
            predicted,
            slice_size: DEFAULT_SLICE_SIZE,
        }
    }

    pub fn with_slice_size(mut self, slice_size: usize) -> Self {
        self.slice_size = slice_size.max(1);
        self
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn preds(&self) -> &Preds {
        &self.preds
    }

    pub fn predicted(&self) -> &[u32] {
        &self.predicted
    }

    /// `matrix[actual][predicted]` counts.
    pub fn confusion_matrix(&self) -> Vec<Vec<usize>> {
        let n = self.classes.len();
        let pairs: Vec<(u32, u32)> = self
            .preds
            .targets
            .iter()
            .copied()
            .zip(self.predicted.iter().copied())
            .collect();

        let mut cm = vec![vec![0usize; n]; n];
        for slice in pairs.chunks(self.slice_size) {
            let mut part = vec![vec![0usize; n]; n];
            for &(actual, pred) in slice {
                if (actual as usize) < n && (pred as usize) < n {
                    part[actual as usize][pred as usize] += 1;
                }
            }
            for (row, other) in cm.iter_mut().zip(part) {
                for (a, b) in row.iter_mut().zip(other) {
                    *a += b;
                }
            }
        }
        cm
    }

    /// Off-diagonal `(actual, predicted, count)` with `count >= min_val`,
    /// most frequent first.
    pub fn most_confused(&self, min_val: usize) -> Vec<(String, String, usize)> {
        let cm = self.confusion_matrix();
        let mut pairs: Vec<(String, String, usize)> = Vec::new();
        for (i, row) in cm.iter().enumerate() {
            for (j, &count) in row.iter().enumerate() {
                if i != j && count >= min_val.max(1) {
                    pairs.push((self.classes[i].clone(), self.classes[j].clone(), count));
                }
            }
        }
        pairs.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });
        pairs
    }

    /// The `k` samples with the highest loss as `(index, loss)`.
    pub fn top_losses(&self, k: usize) -> Vec<(usize, f32)> {
        let mut losses: Vec<(usize, f32)> =
            self.preds.losses.iter().copied().enumerate().collect();
        losses.sort_by(|a, b| b.1.total_cmp(&a.1));
        losses.truncate(k);
        losses
    }

    /// Fraction of correct predictions; 0 with no samples.
    pub fn accuracy(&self) -> f64 {
        if self.predicted.is_empty() {
            return 0.0;
        }
        let hits = self
            .predicted
            .iter()
            .zip(&self.preds.targets)
            .filter(|(p, t)| p == t)
            .count();
        hits as f64 / self.predicted.len() as f64
    }

    /// Text, target, and prediction of the first `k` samples.
    pub fn results_table<S: AsRef<str>>(&self, texts: &[S], k: usize) -> String {
        let mut out = format!("{:<60} | {:<15} | {:<15}\n", "text", "target", "prediction");
        out.push_str(&format!("{}\n", "-".repeat(96)));
        for ((text, &target), &pred) in texts
            .iter()
            .zip(&self.preds.targets)
            .zip(&self.predicted)
            .take(k)
        {
            out.push_str(&format!(
                "{:<60} | {:<15} | {:<15}\n",
                truncate(text.as_ref(), 60),
                self.label(target),
                self.label(pred)
            ));
        }
        out
    }

    pub fn show_results<S: AsRef<str>>(&self, texts: &[S], k: usize) {
        print!("{}", self.results_table(texts, k));
    }

    fn label(&self, index: u32) -> &str {
        self.classes
            .get(index as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }
}

fn truncate(text: &str, width: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        flat
    } else {
        let mut cut: String = flat.chars().take(width - 3).collect();
        cut.push_str("...");
        cut
    }
}

impl fmt::Display for ClassificationInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cm = self.confusion_matrix();
        let width = self
            .classes
            .iter()
            .map(|c| c.chars().count())
            .chain(cm.iter().flatten().map(|v| v.to_string().len()))
            .max()
            .unwrap_or(1)
            .max("actual\\pred".len());

        write!(f, "{:>width$}", "actual\\pred")?;
        for class in &self.classes {
            write!(f, " {class:>width$}")?;
        }
        writeln!(f)?;
        for (class, row) in self.classes.iter().zip(&cm) {
            write!(f, "{class:>width$}")?;
            for count in row {
                write!(f, " {count:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
