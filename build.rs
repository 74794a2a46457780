use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigSection {
    region_size: Option<usize>,
    region_cache_size: Option<usize>,
    use_hugepages: Option<bool>,
    slot_preinit_batch: Option<u32>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
    #[serde(default)]
    classes: Vec<usize>,
}

struct ResolvedConfig {
    region_size: usize,
    region_cache_size: usize,
    use_hugepages: bool,
    slot_preinit_batch: u32,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let region_size = cfg.region_size.unwrap_or(8 * 1024 * 1024);
    assert!(
        region_size.is_power_of_two(),
        "region_size ({}) must be a power of 2",
        region_size
    );
    // A region holds at least a page of metadata plus data; 16 KiB is 4x the
    // smallest common page size.
    assert!(
        region_size >= 16 * 1024,
        "region_size ({}) must be >= 16384",
        region_size
    );

    let region_cache_size = cfg.region_cache_size.unwrap_or(32);
    let use_hugepages = cfg.use_hugepages.unwrap_or(false);
    let slot_preinit_batch = cfg.slot_preinit_batch.unwrap_or(16);

    assert!(region_cache_size > 0, "region_cache_size must be > 0");
    assert!(slot_preinit_batch > 0, "slot_preinit_batch must be > 0");

    ResolvedConfig {
        region_size,
        region_cache_size,
        use_hugepages,
        slot_preinit_batch,
    }
}

fn validate_classes(classes: &[usize], region_size: usize) {
    assert!(!classes.is_empty(), "config must define at least one class");
    assert!(
        classes.len() <= 32,
        "too many size classes ({}, max 32)",
        classes.len()
    );
    for (i, &size) in classes.iter().enumerate() {
        assert!(
            size.is_power_of_two(),
            "class {}: size {} must be a power of 2",
            i,
            size
        );
        assert!(size >= 8, "class {}: size {} must be >= 8", i, size);
        if i > 0 {
            assert!(
                size > classes[i - 1],
                "class {}: size {} must be > previous size {}",
                i,
                size,
                classes[i - 1]
            );
        }
    }
    let max = *classes.last().unwrap();
    assert!(
        max * 2 <= region_size,
        "largest class ({}) must fit a region ({}) with room for metadata",
        max,
        region_size
    );
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/fcmalloc.toml", manifest_dir)
}

fn generate_config(cfg: &ResolvedConfig, classes: &[usize], out_path: &Path) {
    let mut code = String::from("// Auto-generated by build.rs. Do not edit.\n\n");

    code.push_str(&format!(
        "pub const REGION_SIZE: usize = {};\n\
         pub const REGION_CACHE_SIZE: usize = {};\n\
         pub const USE_HUGEPAGES: bool = {};\n\
         pub const SLOT_PREINIT_BATCH: u32 = {};\n\
         pub const SIZE_CLASS_COUNT: usize = {};\n\
         pub const OBJECT_SIZE_MIN: usize = {};\n\
         pub const OBJECT_SIZE_MAX: usize = {};\n\n",
        cfg.region_size,
        cfg.region_cache_size,
        cfg.use_hugepages,
        cfg.slot_preinit_batch,
        classes.len(),
        classes.first().unwrap(),
        classes.last().unwrap(),
    ));

    code.push_str(&format!(
        "pub static OBJECT_SIZES: [usize; {}] = [\n",
        classes.len()
    ));
    for size in classes {
        code.push_str(&format!("    {},\n", size));
    }
    code.push_str("];\n");

    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn main() {
    println!("cargo:rerun-if-env-changed=FCMALLOC_CLASSES");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("FCMALLOC_CLASSES").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);
    let content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", config_path, e));

    let config: Config = toml::from_str(&content).expect("failed to parse TOML config");

    let resolved = resolve_config(&config.config);
    validate_classes(&config.classes, resolved.region_size);

    generate_config(
        &resolved,
        &config.classes,
        &Path::new(&out_dir).join("config_gen.rs"),
    );
}
