use anyhow::{anyhow, Context, Result};
use nnvm::ir::Graph;
use nnvm::schedule::{plan_memory, MemoryBinding, MemoryPool};
use nnvm_backend_ref::Evaluator;
use nnvm_backend_stackvm::{EmitOptions, StackvmModule, StackvmModuleBuilder};

use crate::vm::StackVm;

/// A way of executing a whole graph: inputs in, outputs out, both as
/// row-major bytes in graph declaration order.
pub trait GraphRunner {
    fn name(&self) -> &str;

    fn run(&self, graph: &Graph, inputs: &[Vec<u8>]) -> Result<Vec<Vec<u8>>>;
}

/// Runs graphs through the reference evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatorRunner {
    evaluator: Evaluator,
}

impl EvaluatorRunner {
    pub fn neutral() -> Result<Self> {
        Ok(Self {
            evaluator: Evaluator::neutral()?,
        })
    }
}

impl GraphRunner for EvaluatorRunner {
    fn name(&self) -> &str {
        "evaluator"
    }

    fn run(&self, graph: &Graph, inputs: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let schedule = plan_memory(graph)?;
        let mut pool = MemoryPool::with_constants(graph, &schedule)?;
        let input_connectors = graph.input_connectors();
        if input_connectors.len() != inputs.len() {
            return Err(anyhow!("graph takes {} inputs, {} given", input_connectors.len(), inputs.len()));
        }
        for (connector, data) in input_connectors.iter().zip(inputs) {
            let alloc = schedule
                .memory_at(*connector)
                .with_context(|| format!("input {connector} is not bound"))?;
            pool.write(alloc, data)?;
        }
        self.evaluator.run_schedule(graph, &schedule, &mut pool)?;
        graph
            .output_connectors()
            .iter()
            .map(|connector| {
                let alloc = schedule
                    .memory_at(*connector)
                    .with_context(|| format!("output {connector} is not bound"))?;
                Ok(pool.read(alloc)?)
            })
            .collect()
    }
}

/// Emits a module, round-trips it through the container encoding and runs
/// it on [`StackVm`].
#[derive(Debug, Clone, Default)]
pub struct StackvmRunner {
    options: EmitOptions,
}

impl StackvmRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, graph: &Graph) -> Result<StackvmModule> {
        let schedule = plan_memory(graph)?;
        let module = StackvmModuleBuilder::new("graph", &schedule)
            .with_options(self.options.clone())
            .build(graph, schedule.order())?;
        Ok(StackvmModule::deserialize(&module.serialize()?)?)
    }
}

impl GraphRunner for StackvmRunner {
    fn name(&self) -> &str {
        "stackvm"
    }

    fn run(&self, graph: &Graph, inputs: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let vm = StackVm::load(&self.emit(graph)?)?;
        let manifest = vm.manifest().clone();
        if manifest.inputs.len() != inputs.len() {
            return Err(anyhow!("module takes {} inputs, {} given", manifest.inputs.len(), inputs.len()));
        }
        let mut pool = vm.pool()?;
        for (binding, data) in manifest.inputs.iter().zip(inputs) {
            vm.write_input(&mut pool, &binding.name, data)?;
        }
        vm.run(&mut pool)?;
        manifest
            .outputs
            .iter()
            .map(|binding| Ok(vm.read_output(&pool, &binding.name)?))
            .collect()
    }
}
