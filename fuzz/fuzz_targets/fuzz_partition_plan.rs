#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sabuild::partition::PartitionPlan;

#[derive(Debug, Arbitrary)]
struct Input {
    data_size: u32,
    total_jobs: u16,
    overlap: u32,
}

fuzz_target!(|input: Input| {
    let plan = PartitionPlan::new(
        input.data_size as u64,
        input.total_jobs as usize,
        input.overlap as u64,
    );
    let ranges = plan.ranges();
    if input.data_size == 0 || input.total_jobs == 0 {
        assert!(ranges.is_empty());
        return;
    }

    // Ranges start at 0, ascend, leave no gaps and end at the corpus size
    assert_eq!(ranges[0].0, 0);
    assert_eq!(ranges.last().unwrap().1, input.data_size as u64);
    assert!(ranges.len() <= input.total_jobs as usize);
    for (start, end) in &ranges {
        assert!(start < end);
    }
    for pair in ranges.windows(2) {
        assert!(pair[0].0 < pair[1].0);
        assert!(pair[1].0 <= pair[0].1);
    }
});
