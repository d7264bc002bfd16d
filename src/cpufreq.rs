//! Average CPU frequency from cpufreq statistics.
//!
//! `time_in_state` lists `<frequency kHz> <ticks spent there>` per line. Two
//! snapshots give the time-weighted average frequency between them.

/// Stats file of the first core, relative to the sysfs root.
pub const TIME_IN_STATE: &str = "devices/system/cpu/cpu0/cpufreq/stats/time_in_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreqRecord {
    freq_khz: u64,
    ticks: u64,
}

/// One parsed `time_in_state` sample. Cleared and refilled every round.
#[derive(Debug, Clone, Default)]
pub struct FreqSnapshot {
    records: Vec<FreqRecord>,
}

impl FreqSnapshot {
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces the snapshot with the content of a `time_in_state` file.
    /// Lines that are not two integers are skipped.
    pub fn parse(&mut self, content: &str) {
        self.records.clear();
        for line in content.lines() {
            let mut fields = line.split_whitespace().map(|f| f.parse::<u64>());
            if let (Some(Ok(freq_khz)), Some(Ok(ticks))) = (fields.next(), fields.next()) {
                self.records.push(FreqRecord { freq_khz, ticks });
            }
        }
    }

    fn ticks_at(&self, freq_khz: u64) -> u64 {
        self.records
            .iter()
            .find(|r| r.freq_khz == freq_khz)
            .map_or(0, |r| r.ticks)
    }

    /// Time-weighted average frequency in MHz between `start` and `self`.
    ///
    /// A frequency missing from `start` counts from zero ticks. Returns 0
    /// when no time was spent at any frequency.
    pub fn average_mhz_since(&self, start: &FreqSnapshot) -> u32 {
        let mut total_time: u64 = 0;
        let mut weighted: u64 = 0;
        for rec in &self.records {
            let spent = rec.ticks.saturating_sub(start.ticks_at(rec.freq_khz));
            total_time += spent;
            weighted = weighted.saturating_add(rec.freq_khz.saturating_mul(spent));
        }
        if total_time == 0 {
            return 0;
        }
        (weighted / total_time / 1000) as u32
    }
}
