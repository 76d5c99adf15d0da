// Piecewise-constant tempo map for tick → seconds conversion.
//
// A MIDI file's tempo meta events partition the tick axis into segments,
// each with a fixed microseconds-per-quarter value. The first segment
// always starts at tick 0 with the default tempo (120 BPM) unless a tempo
// event sits exactly at tick 0; the last segment extends forever.
//
// `prefix_seconds[i]` is the elapsed time at the start of segment `i`, so a
// lookup is a binary search over segment starts plus one linear step inside
// the containing segment.

/// Tempo assumed before the first tempo event (120 BPM).
pub const DEFAULT_MICROSECONDS_PER_QUARTER: u32 = 500_000;

/// One constant-tempo stretch of the tick axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoSegment {
    pub tick_start: u64,
    pub microseconds_per_quarter: u32,
}

/// Immutable tempo map built once per decode.
#[derive(Debug, Clone)]
pub struct TempoMap {
    ticks_per_quarter: u16,
    segments: Vec<TempoSegment>,
    prefix_seconds: Vec<f64>,
}

impl TempoMap {
    /// Build from `(tick, microseconds_per_quarter)` tempo events in any order.
    ///
    /// Events at the same tick collapse to the one encountered last.
    /// `ticks_per_quarter` must be non-zero; zero is treated as 1.
    pub fn new(tempo_events: &[(u64, u32)], ticks_per_quarter: u16) -> Self {
        let mut events = tempo_events.to_vec();
        // Stable: same-tick events keep encounter order, so the last one wins.
        events.sort_by_key(|&(tick, _)| tick);

        let mut segments = Vec::with_capacity(events.len() + 1);
        let mut prev_tick = 0u64;
        let mut current = DEFAULT_MICROSECONDS_PER_QUARTER;
        for &(tick, micros) in &events {
            if tick > prev_tick {
                segments.push(TempoSegment {
                    tick_start: prev_tick,
                    microseconds_per_quarter: current,
                });
                prev_tick = tick;
            }
            current = micros;
        }
        segments.push(TempoSegment {
            tick_start: prev_tick,
            microseconds_per_quarter: current,
        });

        let ticks_per_quarter = ticks_per_quarter.max(1);
        let mut prefix_seconds = Vec::with_capacity(segments.len());
        prefix_seconds.push(0.0);
        for pair in segments.windows(2) {
            let elapsed = segment_seconds(
                pair[1].tick_start - pair[0].tick_start,
                pair[0].microseconds_per_quarter,
                ticks_per_quarter,
            );
            let last = prefix_seconds[prefix_seconds.len() - 1];
            prefix_seconds.push(last + elapsed);
        }

        TempoMap {
            ticks_per_quarter,
            segments,
            prefix_seconds,
        }
    }

    pub fn segments(&self) -> &[TempoSegment] {
        &self.segments
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    /// Seconds elapsed from tick 0 to `tick`.
    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        // segments[0] starts at tick 0, so the partition point is at least 1.
        let index = self
            .segments
            .partition_point(|s| s.tick_start <= tick)
            .saturating_sub(1);
        let segment = self.segments[index];
        self.prefix_seconds[index]
            + segment_seconds(
                tick - segment.tick_start,
                segment.microseconds_per_quarter,
                self.ticks_per_quarter,
            )
    }
}

fn segment_seconds(delta_ticks: u64, microseconds_per_quarter: u32, ticks_per_quarter: u16) -> f64 {
    delta_ticks as f64 * f64::from(microseconds_per_quarter)
        / (1_000_000.0 * f64::from(ticks_per_quarter))
}
