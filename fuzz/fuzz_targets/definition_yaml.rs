#![no_main]

use libfuzzer_sys::fuzz_target;
use logsniff_engine::DefinitionLoader;
use logsniff_engine::compiler;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(definition) = DefinitionLoader::parse_yaml(yaml_str, "fuzz-input.yaml") {
            // accepted definitions must survive the compile checks too
            let report = compiler::check(&definition);
            assert!(report.compiled.len() + report.failed.len() + report.skipped_disabled.len()
                == definition.rules.len());
        }
    }
});
