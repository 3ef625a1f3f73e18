//! Stereo position assignment for voices.

/*
Middle-Out Panning
==================

With N voices and a stereo width W (0 - 100 %), the usable pan range is

    min = 63.5 - 63.5 × W/100        max = 63.5 + 63.5 × W/100

split into N equal slices, one pan value at the centre of each:

    value[i] = round(min + (2i + 1) × (max - min) / 2N)

    N = 5, W = 100:   13   38   64   89   114

Values are handed out "middle out": the centre value first, then the pair
either side of it, then the next pair, and so on. The first voices of a
chord sit near the middle and later ones spread outward:

    assigning order:  64  38  89  13  114

Releasing a voice returns its value to the pool. The next request takes the
earliest free value in assigning order, so freed central positions are
reused before the outer ones.

When the width or voice count changes, the value set is recomputed and each
sounding voice asks for the free value closest to its old one.
*/

/// Used when no pan slot is free.
pub const CENTRE_PAN: u8 = 64;

#[derive(Debug, Clone)]
pub struct PanningManager {
    stereo_width: u8,
    // pan values in middle-out order
    assigning_order: Vec<u8>,
    available: Vec<bool>,
}

impl PanningManager {
    /// `max_voices` reserves storage; nothing is allocated afterwards.
    pub fn new(max_voices: usize, num_voices: usize, stereo_width: u8) -> Self {
        let mut manager = Self {
            stereo_width: stereo_width.min(100),
            assigning_order: Vec::with_capacity(max_voices),
            available: Vec::with_capacity(max_voices),
        };
        manager.rebuild(num_voices.min(max_voices));
        manager
    }

    pub fn num_voices(&self) -> usize {
        self.assigning_order.len()
    }

    pub fn stereo_width(&self) -> u8 {
        self.stereo_width
    }

    /// Pan values in the order they are handed out.
    pub fn assigning_order(&self) -> &[u8] {
        &self.assigning_order
    }

    /// Recompute the value set for a new voice count. All values become free.
    pub fn set_num_voices(&mut self, num_voices: usize) {
        debug_assert!(num_voices <= self.assigning_order.capacity());
        self.rebuild(num_voices.min(self.assigning_order.capacity()));
    }

    /// Recompute the value set for a new width. All values become free.
    pub fn update_stereo_width(&mut self, width: u8) {
        self.stereo_width = width.min(100);
        self.rebuild(self.assigning_order.len());
    }

    /// The earliest free value in assigning order, or centre if all are taken.
    pub fn next_pan_val(&mut self) -> u8 {
        match self.available.iter().position(|&free| free) {
            Some(slot) => {
                self.available[slot] = false;
                self.assigning_order[slot]
            }
            None => CENTRE_PAN,
        }
    }

    /// Return a value to the pool. Values not in the current set are ignored.
    pub fn pan_val_turned_off(&mut self, pan: u8) {
        let slot = self
            .assigning_order
            .iter()
            .zip(&self.available)
            .position(|(&value, &free)| value == pan && !free);

        if let Some(slot) = slot {
            self.available[slot] = true;
        }
    }

    /// Take the free value nearest to `old_pan`. Exact ties go to the value
    /// that comes first in assigning order. Centre if nothing is free.
    pub fn closest_new_pan_val_from_old(&mut self, old_pan: u8) -> u8 {
        let slot = self
            .assigning_order
            .iter()
            .zip(&self.available)
            .enumerate()
            .filter(|(_, (_, &free))| free)
            .min_by_key(|(slot, (&value, _))| (value.abs_diff(old_pan), *slot))
            .map(|(slot, _)| slot);

        match slot {
            Some(slot) => {
                self.available[slot] = false;
                self.assigning_order[slot]
            }
            None => CENTRE_PAN,
        }
    }

    /// Make every value available again.
    pub fn reset(&mut self) {
        self.available.fill(true);
    }

    pub fn num_available(&self) -> usize {
        self.available.iter().filter(|&&free| free).count()
    }

    fn rebuild(&mut self, num_voices: usize) {
        self.assigning_order.clear();
        self.available.clear();
        if num_voices == 0 {
            return;
        }

        let half_range = 63.5 * f32::from(self.stereo_width) / 100.0;
        let min = 63.5 - half_range;
        let max = 63.5 + half_range;
        // centre of slice i, kept as one product so exact halves stay exact
        let value_at = |i: usize| {
            let centre = min + (2 * i + 1) as f32 * (max - min) / (2 * num_voices) as f32;
            centre.round().clamp(0.0, 127.0) as u8
        };

        // middle out: distance from the centre index, lower side first on ties
        let centre = (num_voices - 1) as f32 / 2.0;
        let mut remaining = num_voices;
        let mut lower = centre.floor() as isize;
        let mut upper = centre.ceil() as isize;

        if lower == upper {
            self.assigning_order.push(value_at(lower as usize));
            remaining -= 1;
            lower -= 1;
            upper += 1;
        }
        while remaining > 0 {
            if lower >= 0 {
                self.assigning_order.push(value_at(lower as usize));
                remaining -= 1;
            }
            if remaining > 0 && (upper as usize) < num_voices {
                self.assigning_order.push(value_at(upper as usize));
                remaining -= 1;
            }
            lower -= 1;
            upper += 1;
        }

        self.available.resize(num_voices, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_voices_full_width() {
        let manager = PanningManager::new(8, 5, 100);
        assert_eq!(manager.assigning_order(), &[64, 38, 89, 13, 114]);
    }

    #[test]
    fn single_voice_is_centred() {
        let mut manager = PanningManager::new(4, 1, 100);
        assert_eq!(manager.next_pan_val(), 64);
        assert_eq!(manager.next_pan_val(), CENTRE_PAN);
    }

    #[test]
    fn zero_width_collapses_to_centre() {
        let manager = PanningManager::new(4, 4, 0);
        assert!(manager.assigning_order().iter().all(|&p| p == 64));
    }

    #[test]
    fn freed_values_are_reused_before_outer_ones() {
        let mut manager = PanningManager::new(8, 5, 100);
        let first = manager.next_pan_val();
        let second = manager.next_pan_val();
        assert_eq!((first, second), (64, 38));

        manager.pan_val_turned_off(first);
        assert_eq!(manager.next_pan_val(), 64);
        assert_eq!(manager.next_pan_val(), 89);
    }

    #[test]
    fn closest_value_after_width_change() {
        let mut manager = PanningManager::new(8, 4, 100);
        manager.update_stereo_width(50);
        // width 50: values 40, 56, 71, 87
        let order = manager.assigning_order().to_vec();
        assert_eq!(order, vec![56, 71, 40, 87]);

        assert_eq!(manager.closest_new_pan_val_from_old(0), 40);
        assert_eq!(manager.closest_new_pan_val_from_old(64), 71);
        assert_eq!(manager.closest_new_pan_val_from_old(64), 56);
        assert_eq!(manager.num_available(), 1);
    }

    #[test]
    fn ties_go_to_earlier_assigning_slot() {
        let mut manager = PanningManager::new(4, 4, 50);
        // 40 and 56 are both 8 away from 48; 56 comes first in assigning order
        assert_eq!(manager.assigning_order(), &[56, 71, 40, 87]);
        assert_eq!(manager.closest_new_pan_val_from_old(48), 56);
        assert_eq!(manager.closest_new_pan_val_from_old(48), 40);
    }

    #[test]
    fn reset_frees_everything() {
        let mut manager = PanningManager::new(4, 3, 100);
        manager.next_pan_val();
        manager.next_pan_val();
        manager.reset();
        assert_eq!(manager.num_available(), 3);
    }
}
