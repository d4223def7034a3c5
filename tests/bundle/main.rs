//! End-to-end bundle tests through the public `biobundle` API.

mod common;

mod parallel_scan;
mod portable_images;
mod workflow;
