//! Tick to microsecond conversion

use crate::smf::Timing;

/// Microseconds per tick before the first tempo event
pub const DEFAULT_MICROS_PER_TICK: u64 = 10_000;

/// A stretch of the timeline with a constant tick rate
#[derive(Debug, Clone, Copy)]
struct Segment {
    tick: u64,
    /// Microsecond position of `tick`
    micros: u64,
    /// Microseconds per tick as a fraction
    num: u64,
    den: u64,
}

impl Segment {
    fn micros_at(&self, tick: u64) -> u64 {
        let ticks = (tick - self.tick) as u128;
        self.micros + (ticks * self.num as u128 / self.den as u128) as u64
    }
}

/// Tempo map keyed by absolute tick.
///
/// Positions are computed with integer arithmetic from the start of the
/// segment, so the sum of consecutive durations equals the absolute position.
#[derive(Debug, Clone)]
pub struct TempoMap {
    division: Option<u16>,
    segments: Vec<Segment>,
}

impl TempoMap {
    pub fn new(timing: Timing) -> Self {
        let (division, num, den) = match timing {
            Timing::Metrical(division) => (Some(division), DEFAULT_MICROS_PER_TICK, 1),
            Timing::Timecode { fps, subframes } => {
                (None, 1_000_000, fps as u64 * subframes as u64)
            }
        };
        Self {
            division,
            segments: vec![Segment {
                tick: 0,
                micros: 0,
                num,
                den,
            }],
        }
    }

    /// Record a tempo change (microseconds per quarter note) at `tick`.
    ///
    /// Ignored for SMPTE timing.
    pub fn set_tempo(&mut self, tick: u64, micros_per_quarter: u32) {
        let Some(division) = self.division else {
            return;
        };
        let segment = Segment {
            tick,
            micros: 0,
            num: micros_per_quarter as u64,
            den: division as u64,
        };
        let index = self.segments.partition_point(|s| s.tick < tick);
        if self.segments.get(index).is_some_and(|s| s.tick == tick) {
            self.segments[index] = segment;
        } else {
            self.segments.insert(index, segment);
        }
        for i in index.max(1)..self.segments.len() {
            let prev = self.segments[i - 1];
            self.segments[i].micros = prev.micros_at(self.segments[i].tick);
        }
    }

    /// Microsecond position of an absolute tick
    pub fn micros_at(&self, tick: u64) -> u64 {
        let index = self.segments.partition_point(|s| s.tick <= tick);
        self.segments[index.saturating_sub(1)].micros_at(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate() {
        let map = TempoMap::new(Timing::Metrical(96));
        assert_eq!(map.micros_at(0), 0);
        assert_eq!(map.micros_at(3), 30_000);
    }

    #[test]
    fn test_tempo_changes() {
        let mut map = TempoMap::new(Timing::Metrical(480));
        map.set_tempo(0, 500_000);
        assert_eq!(map.micros_at(480), 500_000);
        map.set_tempo(960, 250_000);
        assert_eq!(map.micros_at(960), 1_000_000);
        assert_eq!(map.micros_at(1440), 1_250_000);
        // Replacing the first tempo moves later segments
        map.set_tempo(0, 1_000_000);
        assert_eq!(map.micros_at(960), 2_000_000);
        assert_eq!(map.micros_at(1440), 2_250_000);
    }

    #[test]
    fn test_no_drift_with_uneven_rate() {
        let mut map = TempoMap::new(Timing::Metrical(7));
        map.set_tempo(0, 100_000);
        let total: u64 = (0..700u64)
            .map(|t| map.micros_at(t + 1) - map.micros_at(t))
            .sum();
        assert_eq!(total, map.micros_at(700));
        assert_eq!(total, 10_000_000);
    }

    #[test]
    fn test_timecode_ignores_tempo() {
        let mut map = TempoMap::new(Timing::Timecode {
            fps: 25,
            subframes: 40,
        });
        map.set_tempo(0, 123_456);
        assert_eq!(map.micros_at(1000), 1_000_000);
    }
}
