#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt, alloc_error_handler))]

#[cfg(target_os = "none")]
mod kernel;

/// The kernel only does anything on bare metal; the hosted build exists so
/// `cargo test` can link the workspace.
#[cfg(not(target_os = "none"))]
fn main() {}
