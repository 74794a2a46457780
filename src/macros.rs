/// Bump a global stats counter by one.
///
/// Without the `stats` feature this expands to nothing.
#[macro_export]
macro_rules! stat_inc {
    ($field:ident) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$field
                .fetch_add(1, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Bump a global stats counter by an arbitrary amount.
///
/// Without the `stats` feature this expands to nothing, and the amount
/// expression is never evaluated.
#[macro_export]
macro_rules! stat_add {
    ($field:ident, $amount:expr) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$field
                .fetch_add($amount as u64, ::core::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Record an allocation for a size class in the histogram.
///
/// Compiles to nothing when the `alloc-histogram` feature is disabled.
#[macro_export]
macro_rules! hist_record {
    ($class_index:expr) => {
        #[cfg(feature = "alloc-histogram")]
        {
            $crate::histogram::record($class_index);
        }
    };
}

/// Log an error and abort the process.
///
/// For unrecoverable invariant violations: node-page mapping failure, region
/// placement exhaustion. These are never surfaced to the caller.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        ::log::error!($($arg)*);
        ::std::process::abort();
    }};
}
