//! Cranelift handler generator
//!
//! Emits one native function per handler slot. Every function has the
//! signature `fn(i64) -> i64` and returns a tag word naming the slots that
//! ran: a Single-scale or native handler returns its own index, a scaled
//! handler calls its Single peer and returns `(own << 32) | peer_result`.
//! The peer call is a real cross-slot reference, resolved by Cranelift when
//! the module is finalized.
//!
//! All functions are declared before any is defined, so a handler can call a
//! peer whose body has not been generated yet.

use std::cell::RefCell;

use cranelift::prelude::*;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use crate::bytecode::OperandScale;
use crate::config::BuildConfig;
use crate::dispatch::{
    build_handler_table, DispatchLayout, GenerateError, HandlerArtifact, HandlerGenerator,
    HandlerIndex, HandlerRequest, HandlerTable, SlotKind,
};

use super::error::{JitError, JitResult};

/// A handler defined in the generator's module
#[derive(Debug, Clone)]
pub struct CompiledHandler {
    func_id: FuncId,
    references: SmallVec<[HandlerIndex; 2]>,
}

impl CompiledHandler {
    pub fn func_id(&self) -> FuncId {
        self.func_id
    }
}

impl HandlerArtifact for CompiledHandler {
    fn references(&self) -> &[HandlerIndex] {
        &self.references
    }
}

/// Entry point of a finalized handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFn(*const u8);

// Finalized code is immutable and never freed while its table is alive
unsafe impl Send for HandlerFn {}
unsafe impl Sync for HandlerFn {}

impl HandlerFn {
    #[inline]
    pub fn as_ptr(self) -> *const u8 {
        self.0
    }

    /// Call the handler
    ///
    /// # Safety
    ///
    /// The module that produced this pointer must still be alive.
    #[inline]
    pub unsafe fn call(self, arg: i64) -> i64 {
        let native_fn: unsafe extern "C" fn(i64) -> i64 = std::mem::transmute(self.0);
        native_fn(arg)
    }
}

/// Handler generator backed by a Cranelift JIT module
///
/// Generation borrows the module mutably, so this generator only supports
/// sequential fills.
pub struct CraneliftGenerator {
    module: RefCell<JITModule>,
    func_ids: Vec<FuncId>,
    trace_codegen: bool,
}

impl CraneliftGenerator {
    /// Create a generator for every slot of `layout`
    pub fn new(layout: &DispatchLayout, config: &BuildConfig) -> JitResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", config.opt_level.as_str())
            .map_err(|e| JitError::CompilationError(format!("Failed to set opt_level: {}", e)))?;

        let isa_builder = cranelift_native::builder().map_err(|e| {
            JitError::UnsupportedHost(format!("Failed to create ISA builder: {}", e))
        })?;

        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::CompilationError(format!("Failed to create ISA: {}", e)))?;

        let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let mut module = JITModule::new(builder);

        let sig = handler_signature(&module);
        let func_ids = layout
            .slots()
            .map(|(index, _)| {
                module
                    .declare_function(&format!("handler_{}", index.index()), Linkage::Local, &sig)
                    .map_err(|e| {
                        JitError::CompilationError(format!("Failed to declare function: {}", e))
                    })
            })
            .collect::<JitResult<Vec<_>>>()?;

        debug!(
            target: "ignis::jit::codegen",
            slots = func_ids.len(),
            opt_level = %config.opt_level,
            "Declared handler functions"
        );

        Ok(Self {
            module: RefCell::new(module),
            func_ids,
            trace_codegen: config.trace_codegen,
        })
    }

    fn func_id(&self, index: HandlerIndex) -> JitResult<FuncId> {
        self.func_ids
            .get(index.index())
            .copied()
            .ok_or(JitError::UnknownSlot(index))
    }

    /// Single-scale peer a scaled handler delegates to
    fn delegate(request: &HandlerRequest<'_>) -> Option<HandlerIndex> {
        match request.kind() {
            SlotKind::Bytecode { bytecode, scale } if scale != OperandScale::Single => {
                request.peer(bytecode, OperandScale::Single)
            }
            _ => None,
        }
    }

    fn compile(&self, request: &HandlerRequest<'_>) -> JitResult<CompiledHandler> {
        let index = request.index();
        let func_id = self.func_id(index)?;
        let peer = Self::delegate(request)
            .map(|peer| self.func_id(peer).map(|id| (peer, id)))
            .transpose()?;

        let mut module = self.module.borrow_mut();
        let mut ctx = module.make_context();
        ctx.func.signature = handler_signature(&module);

        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);

        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);

        let arg = builder.block_params(entry_block)[0];
        let own = builder.ins().iconst(types::I64, index.index() as i64);
        let result = match peer {
            Some((_, peer_id)) => {
                let callee = module.declare_func_in_func(peer_id, builder.func);
                let call = builder.ins().call(callee, &[arg]);
                let peer_result = builder.inst_results(call)[0];
                let high = builder.ins().ishl_imm(own, 32);
                builder.ins().bor(high, peer_result)
            }
            None => own,
        };
        builder.ins().return_(&[result]);
        builder.finalize();

        if self.trace_codegen {
            trace!(
                target: "ignis::jit::codegen::ir",
                %index,
                ir = %ctx.func.display(),
                "Generated IR"
            );
        }

        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| JitError::CompilationError(format!("Failed to define function: {}", e)))?;
        module.clear_context(&mut ctx);

        Ok(CompiledHandler {
            func_id,
            references: match peer {
                Some((peer, _)) => smallvec![peer],
                None => SmallVec::new(),
            },
        })
    }

    /// Finalize the module and resolve every handler to its entry point
    pub fn into_native(
        self,
        table: HandlerTable<CompiledHandler>,
    ) -> JitResult<NativeHandlerTable> {
        let mut module = self.module.into_inner();
        module.finalize_definitions().map_err(|e| {
            JitError::CompilationError(format!("Failed to finalize definitions: {}", e))
        })?;

        let table = table.map(|_, handler| {
            Ok::<_, JitError>(HandlerFn(module.get_finalized_function(handler.func_id)))
        })?;

        debug!(target: "ignis::jit::codegen", slots = table.len(), "Finalized native handlers");
        Ok(NativeHandlerTable {
            table,
            _module: module,
        })
    }
}

impl HandlerGenerator for CraneliftGenerator {
    type Artifact = CompiledHandler;

    fn generate(&self, request: &HandlerRequest<'_>) -> Result<CompiledHandler, GenerateError> {
        Ok(self.compile(request)?)
    }
}

fn handler_signature(module: &JITModule) -> Signature {
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(types::I64));
    sig.returns.push(AbiParam::new(types::I64));
    sig
}

/// Handler table whose entries are finalized native functions
///
/// Owns the JIT module so the code stays mapped as long as the table lives.
pub struct NativeHandlerTable {
    table: HandlerTable<HandlerFn>,
    _module: JITModule,
}

impl NativeHandlerTable {
    pub fn table(&self) -> &HandlerTable<HandlerFn> {
        &self.table
    }

    /// Run the handler in slot `index`
    pub fn call(&self, index: HandlerIndex, arg: i64) -> Option<i64> {
        let handler = self.table.get(index)?;
        // Every entry was generated with the `fn(i64) -> i64` signature and
        // the module is kept alive by `self`
        Some(unsafe { handler.call(arg) })
    }

    /// Run the handler reached by dispatching `byte` at `scale`
    pub fn dispatch(&self, byte: u8, scale: OperandScale, arg: i64) -> i64 {
        let handler = *self.table.dispatch(byte, scale);
        unsafe { handler.call(arg) }
    }
}

/// Generate, finalize and verify a native handler table for `config`
pub fn compile_handler_table(config: &BuildConfig) -> JitResult<NativeHandlerTable> {
    let layout = DispatchLayout::new();
    let generator = CraneliftGenerator::new(&layout, config)?;
    let table = build_handler_table(&generator, config)?;
    generator.into_native(table)
}
