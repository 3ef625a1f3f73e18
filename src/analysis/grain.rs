use crate::dsp::Sample;

/// A stored slice of input: two periods starting at a detected onset.
///
/// `samples` keeps its capacity for the lifetime of the pool; storing a new
/// grain only changes its length.
#[derive(Debug, Clone)]
pub struct AnalysisGrain<S: Sample> {
    samples: Vec<S>,
    onset: usize,
    period: usize,
    in_use: bool,
    last_used: u64,
}

impl<S: Sample> AnalysisGrain<S> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            onset: 0,
            period: 0,
            in_use: false,
            last_used: 0,
        }
    }

    /// Copy `source[onset .. onset + 2 * period]`, clipped to the source
    /// length and the grain's capacity.
    fn store(&mut self, source: &[S], onset: usize, period: usize, stamp: u64) {
        let end = (onset + 2 * period)
            .min(source.len())
            .min(onset + self.samples.capacity());

        self.samples.clear();
        if onset < end {
            self.samples.extend_from_slice(&source[onset..end]);
        }
        self.onset = onset;
        self.period = period;
        self.in_use = true;
        self.last_used = stamp;
    }

    /// The stored samples. Shorter than two periods when the grain ran into
    /// the end of the block.
    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    pub fn onset(&self) -> usize {
        self.onset
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Sample index of the grain's centre within its block.
    pub fn centre(&self) -> usize {
        self.onset + self.period
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }
}

/// Fixed set of analysis grains, recycled every frame.
#[derive(Debug, Clone)]
pub struct GrainPool<S: Sample> {
    grains: Vec<AnalysisGrain<S>>,
    clock: u64,
}

impl<S: Sample> GrainPool<S> {
    pub fn new(num_grains: usize, grain_capacity: usize) -> Self {
        Self {
            grains: (0..num_grains)
                .map(|_| AnalysisGrain::with_capacity(grain_capacity))
                .collect(),
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.grains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grains.is_empty()
    }

    pub fn grain_capacity(&self) -> usize {
        self.grains.first().map_or(0, |g| g.samples.capacity())
    }

    /// Release every grain at the start of a new analysis frame.
    pub fn begin_frame(&mut self) {
        for grain in &mut self.grains {
            grain.in_use = false;
        }
    }

    /// Store a grain in the least recently used free slot. Returns `false`
    /// when every slot already holds a grain for this frame.
    pub fn store(&mut self, source: &[S], onset: usize, period: usize) -> bool {
        let Some(slot) = self
            .grains
            .iter_mut()
            .filter(|g| !g.in_use)
            .min_by_key(|g| g.last_used)
        else {
            return false;
        };

        self.clock += 1;
        slot.store(source, onset, period, self.clock);
        true
    }

    pub fn active(&self) -> impl Iterator<Item = &AnalysisGrain<S>> {
        self.grains.iter().filter(|g| g.in_use)
    }

    pub fn num_active(&self) -> usize {
        self.active().count()
    }

    pub fn clear(&mut self) {
        for grain in &mut self.grains {
            grain.samples.clear();
            grain.in_use = false;
            grain.last_used = 0;
        }
        self.clock = 0;
    }

    pub(crate) fn grains(&self) -> &[AnalysisGrain<S>] {
        &self.grains
    }
}
