#![no_main]

use libfuzzer_sys::fuzz_target;
use sabuild::partition::Partition;
use std::path::Path;

fuzz_target!(|name: &str| {
    // Parsing arbitrary file names must not panic, and anything accepted
    // must name itself again
    if let Some(part) = Partition::from_slice_path(Path::new(name)) {
        assert!(part.start < part.end);
        let again = Partition::from_slice_path(&part.source_range_file).unwrap();
        assert_eq!(again, part);
    }
});
