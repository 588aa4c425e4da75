//! Decides storage and compute data layouts per operator invocation.
//!
//! Storage is always channel-first (channel at axis 1, right after batch).
//! Accelerated kernels consume channel-first natively, so storage and
//! compute coincide; without acceleration the compute layout is
//! channel-last and a transpose pair wraps the native call.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataFormat {
    ChannelFirst,
    ChannelLast,
}

impl DataFormat {
    /// Conventional name for the given rank, e.g. "NCHW"/"NHWC" at rank 4.
    pub fn name(&self, rank: usize) -> String {
        let spatial: String = "DHW"
            .chars()
            .skip(3_usize.saturating_sub(rank.saturating_sub(2)))
            .collect();
        match self {
            DataFormat::ChannelFirst => format!("NC{}", spatial),
            DataFormat::ChannelLast => format!("N{}C", spatial),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LayoutPair {
    pub storage: DataFormat,
    pub compute: DataFormat,
}

impl LayoutPair {
    pub fn needs_transform(&self) -> bool {
        self.storage != self.compute
    }
}

/// Pure function of the tensor rank and the acceleration capability.
/// Rank below 2 has no meaningful channel axis; callers only consult the
/// resolver for layout-sensitive operators.
pub fn resolve(rank: usize, accel: bool) -> LayoutPair {
    let _ = rank;
    if accel {
        LayoutPair {
            storage: DataFormat::ChannelFirst,
            compute: DataFormat::ChannelFirst,
        }
    } else {
        LayoutPair {
            storage: DataFormat::ChannelFirst,
            compute: DataFormat::ChannelLast,
        }
    }
}

/// Permutation converting `src` layout into `dst` layout at the given rank.
pub fn perm_between(src: DataFormat, dst: DataFormat, rank: usize) -> Vec<usize> {
    match (src, dst) {
        (DataFormat::ChannelFirst, DataFormat::ChannelLast) => {
            // N C S... -> N S... C
            let mut perm = vec![0];
            perm.extend(2..rank);
            perm.push(1);
            perm
        }
        (DataFormat::ChannelLast, DataFormat::ChannelFirst) => {
            // N S... C -> N C S...
            let mut perm = vec![0, rank - 1];
            perm.extend(1..rank - 1);
            perm
        }
        _ => (0..rank).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let accel = resolve(4, true);
        assert!(!accel.needs_transform());
        assert_eq!(accel.compute, DataFormat::ChannelFirst);

        let plain = resolve(4, false);
        assert!(plain.needs_transform());
        assert_eq!(plain.storage, DataFormat::ChannelFirst);
        assert_eq!(plain.compute, DataFormat::ChannelLast);
    }

    #[test]
    fn test_perm_round_trip() {
        for rank in 3..6 {
            let fwd = perm_between(DataFormat::ChannelFirst, DataFormat::ChannelLast, rank);
            let bwd = perm_between(DataFormat::ChannelLast, DataFormat::ChannelFirst, rank);
            let mut composed: Vec<usize> = (0..rank).collect();
            composed = composed.iter().map(|&i| fwd[bwd[i]]).collect();
            assert_eq!(composed, (0..rank).collect::<Vec<_>>());
        }

        assert_eq!(
            perm_between(DataFormat::ChannelFirst, DataFormat::ChannelLast, 4),
            vec![0, 2, 3, 1]
        );
        assert_eq!(
            perm_between(DataFormat::ChannelLast, DataFormat::ChannelFirst, 4),
            vec![0, 3, 1, 2]
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(DataFormat::ChannelFirst.name(4), "NCHW");
        assert_eq!(DataFormat::ChannelLast.name(4), "NHWC");
        assert_eq!(DataFormat::ChannelFirst.name(3), "NCW");
        assert_eq!(DataFormat::ChannelLast.name(5), "NDHWC");
    }
}
