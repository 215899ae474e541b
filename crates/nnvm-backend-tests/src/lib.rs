//! Shared test support for nnvm backends: fixture graphs covering every
//! operator kind, a [`GraphRunner`] per backend, a stack VM that executes
//! emitted modules on the kernel library, and the suites wired up by
//! [`define_backend_tests!`].

pub mod fixtures;
pub mod runner;
pub mod smoke;
pub mod vm;

pub use fixtures::Fixture;
pub use runner::{EvaluatorRunner, GraphRunner, StackvmRunner};
pub use vm::{StackVm, VmError};

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $runner_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::smoke;

            #[test]
            fn smoke_matmul_matches_expected() {
                let runner = ($runner_ctor)();
                smoke::matmul_matches_expected(&runner);
            }

            #[test]
            fn smoke_fused_activation_clamps_binary_result() {
                let runner = ($runner_ctor)();
                smoke::fused_activation_clamps_binary_result(&runner);
            }

            #[test]
            fn smoke_reflect_pad_mirrors_interior() {
                let runner = ($runner_ctor)();
                smoke::reflect_pad_mirrors_interior(&runner);
            }

            #[test]
            fn smoke_gather_selects_rows() {
                let runner = ($runner_ctor)();
                smoke::gather_selects_rows(&runner);
            }

            #[test]
            fn smoke_batch_to_space_interleaves_blocks() {
                let runner = ($runner_ctor)();
                smoke::batch_to_space_interleaves_blocks(&runner);
            }

            #[test]
            fn smoke_table_lookup_maps_bytes() {
                let runner = ($runner_ctor)();
                smoke::table_lookup_maps_bytes(&runner);
            }

            #[test]
            fn smoke_rejects_wrong_input_count() {
                let runner = ($runner_ctor)();
                smoke::rejects_wrong_input_count(&runner);
            }

            #[test]
            fn smoke_fixtures_produce_sized_outputs() {
                let runner = ($runner_ctor)();
                smoke::fixtures_produce_sized_outputs(&runner);
            }
        }
    };
}
