//! Build-time configuration constants.
//!
//! Generated by `build.rs` from `fcmalloc.toml` (or the file named by the
//! `FCMALLOC_CLASSES` environment variable). See that file for the available
//! options and their defaults.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

// build.rs validates the config, but these are load-bearing for pointer
// masking and class index math, so pin them here too.
const _: () = assert!(REGION_SIZE.is_power_of_two());
const _: () = assert!(OBJECT_SIZE_MIN.is_power_of_two());
const _: () = assert!(OBJECT_SIZE_MAX.is_power_of_two());
const _: () = assert!(SIZE_CLASS_COUNT > 0);
