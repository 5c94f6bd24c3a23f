//! Adapter enumeration results and the performance ranking policy.

/// Scoring weights for adapter selection.
const SCORE_DISCRETE_GPU: u32 = 10000;
const SCORE_INTEGRATED_GPU: u32 = 1000;
const SCORE_VIRTUAL_GPU: u32 = 500;
const SCORE_CPU: u32 = 100;
const SCORE_OTHER: u32 = 10;
const SCORE_PER_GB_VRAM: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// Api version reported by the adapter, `(major, minor)`.
///
/// Vulkan reports its api version, DirectX12 its highest supported feature level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub kind: AdapterKind,
    pub dedicated_video_memory: u64,
    pub api_version: ApiVersion,
    /// False when the adapter can not drive the requested window or lacks required queues.
    pub usable: bool,
}

impl AdapterInfo {
    /// Higher is better, 0 means unusable.
    pub fn score(&self, version_scores: &[(ApiVersion, u32)]) -> u32 {
        if !self.usable {
            return 0;
        }

        let mut score = match self.kind {
            AdapterKind::Discrete => SCORE_DISCRETE_GPU,
            AdapterKind::Integrated => SCORE_INTEGRATED_GPU,
            AdapterKind::Virtual => SCORE_VIRTUAL_GPU,
            AdapterKind::Cpu => SCORE_CPU,
            AdapterKind::Other => SCORE_OTHER,
        };

        // highest matching version only
        if let Some((_, bonus)) = version_scores
            .iter()
            .filter(|(version, _)| self.api_version >= *version)
            .max_by_key(|(version, _)| *version)
        {
            score += bonus;
        }

        let vram_gb = (self.dedicated_video_memory / (1024 * 1024 * 1024)) as u32;
        score + vram_gb * SCORE_PER_GB_VRAM
    }
}

/// Sort adapters from best to worst, unusable adapters last. Stable for equal scores.
pub fn rank_adapters(adapters: &mut [AdapterInfo], version_scores: &[(ApiVersion, u32)]) {
    adapters.sort_by_key(|adapter| std::cmp::Reverse(adapter.score(version_scores)));
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONS: [(ApiVersion, u32); 2] = [(ApiVersion::new(1, 2), 200), (ApiVersion::new(1, 3), 400)];

    fn adapter(name: &str, kind: AdapterKind, vram_gb: u64, minor: u32) -> AdapterInfo {
        AdapterInfo {
            name: name.to_owned(),
            vendor_id: 0,
            device_id: 0,
            kind,
            dedicated_video_memory: vram_gb * 1024 * 1024 * 1024,
            api_version: ApiVersion::new(1, minor),
            usable: true,
        }
    }

    #[test]
    fn discrete_beats_integrated() {
        let mut adapters = vec![
            adapter("igpu", AdapterKind::Integrated, 2, 3),
            adapter("cpu", AdapterKind::Cpu, 0, 3),
            adapter("dgpu", AdapterKind::Discrete, 8, 2),
        ];
        rank_adapters(&mut adapters, &VERSIONS);
        let names: Vec<_> = adapters.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["dgpu", "igpu", "cpu"]);
    }

    #[test]
    fn memory_and_version_break_ties() {
        let small = adapter("small", AdapterKind::Discrete, 4, 3);
        let large = adapter("large", AdapterKind::Discrete, 12, 3);
        assert!(large.score(&VERSIONS) > small.score(&VERSIONS));
        assert_eq!(small.score(&VERSIONS), 10000 + 400 + 400);

        let old = adapter("old", AdapterKind::Discrete, 4, 1);
        assert_eq!(old.score(&VERSIONS), 10000 + 400);
    }

    #[test]
    fn unusable_adapter_scores_zero() {
        let mut gpu = adapter("gpu", AdapterKind::Discrete, 8, 3);
        gpu.usable = false;
        assert_eq!(gpu.score(&VERSIONS), 0);
    }
}
