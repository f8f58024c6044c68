use crate::sim::materials::NUM_BANDS;

use super::attenuator::AttenuatedImpulse;

/// Impulses arriving later than this are dropped, in seconds.
pub const MAX_TIME_LIMIT: f64 = 20.0;

/// Number of samples needed to hold impulses up to `max_time` seconds.
pub fn flattened_len(max_time: f64, sample_rate: f64) -> usize {
    (max_time.clamp(0.0, MAX_TIME_LIMIT) * sample_rate).ceil() as usize + 1
}

/// Accumulates impulse energies into one sample buffer per band.
///
/// Each impulse lands on the sample nearest its arrival time. Energies
/// landing on the same sample add up. Arrivals before time zero land on
/// the first sample.
pub fn flatten_impulses(impulses: &[AttenuatedImpulse], sample_rate: f64) -> Vec<Vec<f64>> {
    let max_time = impulses.iter().fold(0.0_f64, |t, i| t.max(i.time));
    let len = flattened_len(max_time, sample_rate);
    let mut bands = vec![vec![0.0; len]; NUM_BANDS];
    for impulse in impulses {
        let sample = (impulse.time.max(0.0) * sample_rate).round() as usize;
        if sample < len {
            for (band, &v) in bands.iter_mut().zip(&impulse.volume) {
                band[sample] += v;
            }
        }
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(time: f64, v: f64) -> AttenuatedImpulse {
        AttenuatedImpulse {
            volume: [v; NUM_BANDS],
            time,
        }
    }

    #[test]
    fn test_flatten_positions() {
        let bands = flatten_impulses(&[at(0.0, 1.0), at(0.01, 0.5), at(0.0101, 0.25)], 1000.0);
        assert_eq!(bands.len(), NUM_BANDS);
        // ceil(10.1) + 1
        assert_eq!(bands[0].len(), 12);
        assert_eq!(bands[3][0], 1.0);
        assert_eq!(bands[3][10], 0.75);
        assert_eq!(bands[3][1..10].iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn test_flatten_empty() {
        let bands = flatten_impulses(&[], 44100.0);
        assert!(bands.iter().all(|b| b == &vec![0.0]));
    }

    #[test]
    fn test_flatten_early_arrival_kept() {
        let bands = flatten_impulses(&[at(-0.0003, 0.5), at(0.002, 0.25)], 1000.0);
        assert_eq!(bands[0][0], 0.5);
        assert_eq!(bands[0][2], 0.25);
    }

    #[test]
    fn test_flatten_time_limit() {
        let bands = flatten_impulses(&[at(0.5, 1.0), at(25.0, 1.0)], 100.0);
        assert_eq!(bands[0].len(), flattened_len(MAX_TIME_LIMIT, 100.0));
        assert_eq!(bands[0].iter().sum::<f64>(), 1.0);
    }
}
