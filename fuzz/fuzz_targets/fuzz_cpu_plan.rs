//! Fuzz target: `plan_request`
//!
//! Decodes arbitrary CPU reconfiguration bodies. Accepted plans must hold
//! distinct ascending ids below the limit.
//!
//! cargo fuzz run fuzz_cpu_plan

#![no_main]

use domsvc::ds::dr_cpu::plan_request;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&limit, body)) = data.split_first() else {
        return;
    };
    let max_cpus = u32::from(limit).max(1);

    if let Ok(plan) = plan_request(body, max_cpus) {
        assert!(plan.cpus.windows(2).all(|w| w[0] < w[1]));
        assert!(plan.cpus.iter().all(|&cpu| cpu < max_cpus));
    }
});
