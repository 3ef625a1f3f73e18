use crate::dsp::Sample;

/// Finds grain onsets: one per pitch period, at the first zero crossing.
///
/// The signal is cut into period-long windows starting at 0. In each window
/// the onset is the first sample that is exactly zero or whose sign differs
/// from the window's first sample. A window without a crossing contributes
/// no onset, so onsets are always at least one sample apart and never
/// duplicated.
#[derive(Debug, Clone)]
pub struct GrainExtractor {
    onsets: Vec<usize>,
}

impl GrainExtractor {
    /// `max_onsets` bounds the number of period windows in one block.
    pub fn new(max_onsets: usize) -> Self {
        Self {
            onsets: Vec::with_capacity(max_onsets),
        }
    }

    pub fn clear(&mut self) {
        self.onsets.clear();
    }

    pub fn find_onsets<S: Sample>(&mut self, signal: &[S], period: usize) -> &[usize] {
        self.onsets.clear();
        if period == 0 {
            return &self.onsets;
        }

        let mut start = 0;
        while start < signal.len() {
            let end = (start + period).min(signal.len());
            if let Some(onset) = first_crossing(&signal[start..end]) {
                // never grow on the render thread
                if self.onsets.len() == self.onsets.capacity() {
                    break;
                }
                self.onsets.push(start + onset);
            }
            start += period;
        }

        &self.onsets
    }
}

fn first_crossing<S: Sample>(window: &[S]) -> Option<usize> {
    let first = *window.first()?;
    if first == S::ZERO {
        return Some(0);
    }

    let started_positive = first.is_positive();
    window
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, &s)| s == S::ZERO || s.is_positive() != started_positive)
        .map(|(i, _)| i)
}
