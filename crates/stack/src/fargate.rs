//! Fargate task size compatibility table.
//!
//! Fargate only accepts fixed CPU/memory combinations at the task level:
//!
//! | CPU units | Memory (MiB)                          |
//! |-----------|---------------------------------------|
//! | 256       | 512, 1024, 2048                       |
//! | 512       | 1024 – 4096 in 1024 steps             |
//! | 1024      | 2048 – 8192 in 1024 steps             |
//! | 2048      | 4096 – 16384 in 1024 steps            |
//! | 4096      | 8192 – 30720 in 1024 steps            |
//! | 8192      | 16384 – 61440 in 4096 steps           |
//! | 16384     | 32768 – 122880 in 8192 steps          |

/// A row of the table: memory range accepted for one CPU value.
#[derive(Debug, Clone, Copy)]
struct SizeRow {
    cpu: u32,
    min_mib: u32,
    max_mib: u32,
    step_mib: u32,
}

const TABLE: [SizeRow; 7] = [
    SizeRow { cpu: 256, min_mib: 512, max_mib: 2048, step_mib: 0 },
    SizeRow { cpu: 512, min_mib: 1024, max_mib: 4096, step_mib: 1024 },
    SizeRow { cpu: 1024, min_mib: 2048, max_mib: 8192, step_mib: 1024 },
    SizeRow { cpu: 2048, min_mib: 4096, max_mib: 16384, step_mib: 1024 },
    SizeRow { cpu: 4096, min_mib: 8192, max_mib: 30720, step_mib: 1024 },
    SizeRow { cpu: 8192, min_mib: 16384, max_mib: 61440, step_mib: 4096 },
    SizeRow { cpu: 16384, min_mib: 32768, max_mib: 122_880, step_mib: 8192 },
];

/// The 0.25 vCPU row is irregular.
const QUARTER_VCPU_MEMORY: [u32; 3] = [512, 1024, 2048];

impl SizeRow {
    fn memory_options(self) -> Vec<u32> {
        if self.step_mib == 0 {
            return QUARTER_VCPU_MEMORY.to_vec();
        }
        (self.min_mib..=self.max_mib)
            .step_by(self.step_mib as usize)
            .collect()
    }
}

/// Whether Fargate accepts `cpu` units with `memory_mib` of memory.
#[must_use]
pub fn accepts(cpu: u32, memory_mib: u32) -> bool {
    memory_options(cpu).is_some_and(|options| options.contains(&memory_mib))
}

/// Memory sizes accepted for a CPU value, or `None` if the CPU value itself
/// is not a Fargate size.
#[must_use]
pub fn memory_options(cpu: u32) -> Option<Vec<u32>> {
    TABLE
        .iter()
        .find(|row| row.cpu == cpu)
        .map(|row| row.memory_options())
}

/// Every accepted `(cpu, memory_mib)` pair.
#[must_use]
pub fn combinations() -> Vec<(u32, u32)> {
    TABLE
        .iter()
        .flat_map(|row| {
            row.memory_options()
                .into_iter()
                .map(move |memory| (row.cpu, memory))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_vcpu_row() {
        assert!(accepts(256, 512));
        assert!(accepts(256, 1024));
        assert!(accepts(256, 2048));
        assert!(!accepts(256, 3072));
        assert!(!accepts(256, 256));
    }

    #[test]
    fn test_stepped_rows() {
        assert!(accepts(512, 3072));
        assert!(accepts(4096, 30720));
        assert!(!accepts(4096, 31744));
        assert!(accepts(8192, 20480));
        assert!(!accepts(8192, 18432));
        assert!(accepts(16384, 122_880));
        assert!(!accepts(16384, 36864));
    }

    #[test]
    fn test_unknown_cpu() {
        assert!(memory_options(300).is_none());
        assert!(!accepts(300, 512));
        assert!(!accepts(0, 0));
    }

    #[test]
    fn test_combination_count() {
        let all = combinations();
        // 3 + 4 + 7 + 13 + 23 + 12 + 12
        assert_eq!(all.len(), 74);
        assert!(all.iter().all(|&(cpu, memory)| accepts(cpu, memory)));
    }
}
