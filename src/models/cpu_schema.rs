use crate::error::{PolicyError, PolicyResult};
use crate::models::CoreMask;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CoreType {
    Performance,
    Efficiency,
    VCache,
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogicalCore {
    pub id: usize,
    pub core_type: CoreType,
    pub partition: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorePartition {
    pub label: String,
    pub cores: CoreMask,
}

/// How the logical cores of a CPU are split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CpuArchitecture {
    /// One cache domain, one core type.
    Flat,
    /// Two core complex dies sharing nothing but memory.
    DualCcd,
    /// Performance cores (2 threads each) listed first, then efficiency cores (1 thread each).
    Hybrid { p_cores: usize, e_cores: usize },
}

/// Logical core layout, built once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuTopology {
    pub model: String,
    pub total_cores: usize,
    pub architecture: CpuArchitecture,
    pub partitions: Vec<CorePartition>,
    pub cores: Vec<LogicalCore>,
    pub is_dual_partition: bool,
    pub has_3d_cache: bool,
}

impl CpuTopology {
    /// Builds the partition layout for `total_cores` logical cores.
    ///
    /// Dual-CCD parts split at `total/2`; hybrid parts split after `p_cores * 2` threads.
    /// A split that would leave one side empty degrades to a flat layout.
    pub fn build(
        model: impl Into<String>,
        total_cores: usize,
        architecture: CpuArchitecture,
        has_3d_cache: bool,
    ) -> PolicyResult<Self> {
        if total_cores == 0 {
            return Err(PolicyError::Config(
                "topology needs at least one logical core".into(),
            ));
        }
        if total_cores > CoreMask::MAX_CORES {
            return Err(PolicyError::CoreOutOfRange {
                index: total_cores - 1,
                max: CoreMask::MAX_CORES,
            });
        }

        let split = match architecture {
            CpuArchitecture::Flat => None,
            CpuArchitecture::DualCcd => Some(total_cores / 2),
            CpuArchitecture::Hybrid { p_cores, .. } => Some(p_cores.saturating_mul(2)),
        }
        .filter(|&k| k > 0 && k < total_cores);

        let model = model.into();
        let Some(k) = split else {
            let core_type = if has_3d_cache {
                CoreType::VCache
            } else {
                CoreType::Standard
            };
            return Ok(Self {
                model,
                total_cores,
                architecture: CpuArchitecture::Flat,
                partitions: vec![CorePartition {
                    label: "All Cores".into(),
                    cores: CoreMask::from_range(total_cores),
                }],
                cores: (0..total_cores)
                    .map(|id| LogicalCore {
                        id,
                        core_type,
                        partition: 0,
                    })
                    .collect(),
                is_dual_partition: false,
                has_3d_cache,
            });
        };

        let (labels, types) = match architecture {
            CpuArchitecture::Hybrid { .. } => (
                ["Performance Cores", "Efficient Cores"],
                [CoreType::Performance, CoreType::Efficiency],
            ),
            _ if has_3d_cache => (["CCD0", "CCD1"], [CoreType::VCache, CoreType::Standard]),
            _ => (["CCD0", "CCD1"], [CoreType::Standard, CoreType::Standard]),
        };

        let partitions = vec![
            CorePartition {
                label: labels[0].into(),
                cores: CoreMask::from_range(k),
            },
            CorePartition {
                label: labels[1].into(),
                cores: CoreMask::from_span(k, total_cores),
            },
        ];

        let cores = (0..total_cores)
            .map(|id| {
                let partition = usize::from(id >= k);
                LogicalCore {
                    id,
                    core_type: types[partition],
                    partition,
                }
            })
            .collect();

        Ok(Self {
            model,
            total_cores,
            architecture,
            partitions,
            cores,
            is_dual_partition: true,
            has_3d_cache,
        })
    }

    pub fn flat(model: impl Into<String>, total_cores: usize) -> PolicyResult<Self> {
        Self::build(model, total_cores, CpuArchitecture::Flat, false)
    }

    pub fn all_cores(&self) -> CoreMask {
        CoreMask::from_range(self.total_cores)
    }

    /// Union of every partition.
    pub fn assigned_cores(&self) -> CoreMask {
        self.partitions
            .iter()
            .fold(CoreMask::empty(), |acc, p| acc | p.cores)
    }

    pub fn partition_of(&self, core: usize) -> Option<&CorePartition> {
        self.cores
            .get(core)
            .and_then(|c| self.partitions.get(c.partition))
    }

    /// Naive first-half/second-half split over the current core count, ignoring partitions.
    pub fn half_split(&self) -> (CoreMask, CoreMask) {
        half_split(self.total_cores)
    }
}

/// `([0, n/2), [n/2, n))`.
pub fn half_split(n: usize) -> (CoreMask, CoreMask) {
    let k = n / 2;
    (CoreMask::from_range(k), CoreMask::from_span(k, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partitioned(topology: &CpuTopology) {
        let mut union = CoreMask::empty();
        for p in &topology.partitions {
            assert!(union.is_disjoint(&p.cores), "partitions overlap");
            union = union | p.cores;
        }
        assert_eq!(union, topology.all_cores());
    }

    #[test]
    fn dual_ccd_splits_in_half() {
        let topology = CpuTopology::build("Ryzen 9 7950X", 32, CpuArchitecture::DualCcd, false).unwrap();
        assert!(topology.is_dual_partition);
        assert_eq!(topology.partitions[0].cores, CoreMask::from_range(16));
        assert_eq!(topology.partitions[1].cores.count_ones(), 16);
        assert_partitioned(&topology);
    }

    #[test]
    fn hybrid_counts_two_threads_per_p_core() {
        let arch = CpuArchitecture::Hybrid { p_cores: 6, e_cores: 8 };
        let topology = CpuTopology::build("i5-14600KF", 20, arch, false).unwrap();
        assert_eq!(topology.partitions[0].label, "Performance Cores");
        assert_eq!(topology.partitions[0].cores.count_ones(), 12);
        assert_eq!(topology.partitions[1].cores.count_ones(), 8);
        assert_eq!(topology.cores[11].core_type, CoreType::Performance);
        assert_eq!(topology.cores[12].core_type, CoreType::Efficiency);
        assert_eq!(topology.cores[12].partition, 1);
        assert_partitioned(&topology);
    }

    #[test]
    fn x3d_marks_first_ccd_as_vcache() {
        let topology = CpuTopology::build("7950X3D", 32, CpuArchitecture::DualCcd, true).unwrap();
        assert_eq!(topology.cores[0].core_type, CoreType::VCache);
        assert_eq!(topology.cores[31].core_type, CoreType::Standard);
    }

    #[test]
    fn hybrid_without_e_threads_degrades_to_flat() {
        let arch = CpuArchitecture::Hybrid { p_cores: 6, e_cores: 0 };
        let topology = CpuTopology::build("i5-12400", 12, arch, false).unwrap();
        assert_eq!(topology.architecture, CpuArchitecture::Flat);
        assert!(!topology.is_dual_partition);
        assert_eq!(topology.partitions.len(), 1);
        assert_partitioned(&topology);
    }

    #[test]
    fn rejects_core_counts_past_mask_width() {
        assert!(CpuTopology::flat("big iron", 257).is_err());
        assert!(CpuTopology::flat("nothing", 0).is_err());
        assert!(CpuTopology::flat("wide", 256).is_ok());
    }

    #[test]
    fn half_split_is_balanced_and_disjoint() {
        for n in 1..=40 {
            let (game, system) = half_split(n);
            assert!(game.is_disjoint(&system));
            assert_eq!(game | system, CoreMask::from_range(n));
            assert_eq!(game.count_ones() as usize, n / 2);
            assert_eq!(system.count_ones() as usize, n - n / 2);
        }
    }

    #[test]
    fn partition_lookup_by_core() {
        let topology = CpuTopology::build("x", 8, CpuArchitecture::DualCcd, false).unwrap();
        assert_eq!(topology.partition_of(5).map(|p| p.label.as_str()), Some("CCD1"));
        assert!(topology.partition_of(8).is_none());
        assert_eq!(topology.assigned_cores(), topology.all_cores());
    }
}
