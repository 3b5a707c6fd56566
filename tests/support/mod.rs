// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and small fixtures for building workflow trees.

use std::path::Path;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("stowage=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Writes a minimal workflow tree with one module per `(name, container)` pair.
#[allow(dead_code)]
pub fn write_workflow(root: &Path, config: &str, modules: &[(&str, &str)]) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(
        root.join("main.nf"),
        "params.input = null\nparams.outdir = 'results'\n",
    )
    .unwrap();
    std::fs::write(root.join("nextflow.config"), config).unwrap();
    for (name, container) in modules {
        let dir = root.join("modules").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("main.nf"),
            format!(
                "process {} {{\n    container \"{}\"\n\n    script:\n    \"\"\"\n    true\n    \"\"\"\n}}\n",
                name.to_uppercase(),
                container
            ),
        )
        .unwrap();
    }
}
