#![no_main]

use std::path::PathBuf;
use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use regex::RegexBuilder;

use logsniff_engine::{CompiledRule, SniffSet};

/// Structured input: a handful of patterns and one log line.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    patterns: Vec<String>,
    line: String,
}

fuzz_target!(|input: FuzzInput| {
    let mut set = SniffSet::new("fuzz", "/tmp/fuzz.log");

    for (i, pattern) in input.patterns.iter().take(8).enumerate() {
        // bounded compiled size keeps each iteration fast
        let Ok(trigger_regex) = RegexBuilder::new(pattern).size_limit(1 << 20).build() else {
            continue;
        };
        set.rules.push(CompiledRule {
            name: format!("rule_{i}"),
            script_path: PathBuf::from(format!("/tmp/fuzz.rule_{i}.sh")),
            trigger_regex,
            timeout: Duration::from_secs(1),
        });
    }

    let matched: Vec<usize> = set
        .matching_rules(&input.line)
        .map(|rule| set.rules.iter().position(|r| r.name == rule.name).unwrap_or(usize::MAX))
        .collect();

    // results come back in rule order
    assert!(matched.windows(2).all(|w| w[0] < w[1]));
});
