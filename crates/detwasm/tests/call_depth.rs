use detwasm::types::WasmValue;
use detwasm::{
    Backend, Error, ExecutionStrategy, FloatPolicy, HardFloat, HostFunction, Imports, Interpreter, Jit, Options,
    SoftFloat, Trap, WasmAllocator,
};
use eyre::Result;

const RECURSION: &str = r#"
(module
  (type $rec (func (param i32)))
  (import "env" "host.call" (func $host))

  (table 2 funcref)
  (elem (i32.const 0) $call.indirect $call.indirect.host)

  (func $call (export "call") (param i32)
    (if (local.get 0)
      (then (call $call (i32.sub (local.get 0) (i32.const 1))))))

  (func $call.indirect (export "call.indirect") (param i32)
    (if (local.get 0)
      (then (call_indirect (type $rec) (i32.sub (local.get 0) (i32.const 1)) (i32.const 0)))))

  (func $call.host (export "call.host") (param i32)
    (if (local.get 0)
      (then (call $call.host (i32.sub (local.get 0) (i32.const 1))))
      (else (call $host))))

  (func $call.indirect.host (export "call.indirect.host") (param i32)
    (if (local.get 0)
      (then (call_indirect (type $rec) (i32.sub (local.get 0) (i32.const 1)) (i32.const 1)))
      (else (call $host))))

  (func (export "trap") (param i32) (result i32)
    (i32.div_u (i32.const 1) (local.get 0)))
)
"#;

fn backend<E: ExecutionStrategy, F: FloatPolicy>(options: Options) -> Result<Backend<(), E, F>> {
    let _ = pretty_env_logger::try_init();
    let wasm = wat::parse_str(RECURSION)?;

    let mut imports = Imports::new();
    imports.define("env", "host.call", HostFunction::typed::<(), ()>(|_, ()| Ok(())))?;

    let mut backend = Backend::with_options(&wasm, options)?;
    backend.set_memory_allocator(WasmAllocator::new());
    backend.set_imports(imports);
    backend.initialize(&mut (), None)?;
    Ok(backend)
}

fn is_depth_trap(result: detwasm::Result<()>, ceiling: u32) -> bool {
    matches!(result, Err(Error::Trap(Trap::CallDepthExceeded { max_depth })) if max_depth == ceiling)
}

/// Check the boundary of every call shape against `ceiling`.
fn check_boundaries<E: ExecutionStrategy, F: FloatPolicy>(backend: &mut Backend<(), E, F>, ceiling: u32) -> Result<()> {
    let arg = |n: u32| [WasmValue::I32(n as i32)];

    for name in ["call", "call.indirect"] {
        // the entry call plus `n` nested calls
        assert_eq!(backend.call_with_return(&mut (), "env", name, &arg(ceiling - 1))?, None, "{name}");
        assert!(is_depth_trap(backend.call(&mut (), "env", name, &arg(ceiling)), ceiling), "{name}");
        assert_eq!(backend.call_depth(), 0);
    }

    for name in ["call.host", "call.indirect.host"] {
        // the host call at the tip takes one unit as well
        assert_eq!(backend.call_with_return(&mut (), "env", name, &arg(ceiling - 2))?, None, "{name}");
        assert!(is_depth_trap(backend.call(&mut (), "env", name, &arg(ceiling - 1)), ceiling), "{name}");
        assert_eq!(backend.call_depth(), 0);
    }

    Ok(())
}

fn default_ceiling<E: ExecutionStrategy, F: FloatPolicy>() -> Result<()> {
    let mut backend = backend::<E, F>(Options::default())?;
    assert_eq!(backend.options().max_call_depth, 251);

    backend.call(&mut (), "env", "call", &[WasmValue::I32(250)])?;
    assert!(backend.call(&mut (), "env", "call", &[WasmValue::I32(251)]).is_err());
    backend.call(&mut (), "env", "call.host", &[WasmValue::I32(249)])?;
    assert!(backend.call(&mut (), "env", "call.host", &[WasmValue::I32(250)]).is_err());

    check_boundaries(&mut backend, 251)
}

fn reconfigured_ceiling<E: ExecutionStrategy, F: FloatPolicy>() -> Result<()> {
    let mut backend = backend::<E, F>(Options::default())?;
    check_boundaries(&mut backend, 251)?;

    for ceiling in [151, 51] {
        backend.initialize(&mut (), Some(Options::with_max_call_depth(ceiling)))?;
        assert_eq!(backend.options().max_call_depth, ceiling);
        check_boundaries(&mut backend, ceiling)?;
    }

    Ok(())
}

fn deepest_supported_ceiling<E: ExecutionStrategy, F: FloatPolicy>() -> Result<()> {
    let mut backend = backend::<E, F>(Options::with_max_call_depth(Options::MAX_CALL_DEPTH))?;
    check_boundaries(&mut backend, Options::MAX_CALL_DEPTH)
}

fn oversized_ceiling_is_refused<E: ExecutionStrategy, F: FloatPolicy>() -> Result<()> {
    let too_deep = Options::with_max_call_depth(Options::MAX_CALL_DEPTH + 1);

    let mut backend = backend::<E, F>(Options::default())?;
    assert!(matches!(backend.initialize(&mut (), Some(too_deep)), Err(Error::InvalidOptions(_))));
    assert!(!backend.is_initialized());
    assert_eq!(backend.options().max_call_depth, 251);
    assert!(matches!(backend.call(&mut (), "env", "call", &[WasmValue::I32(1)]), Err(Error::NotInitialized)));

    backend.initialize(&mut (), None)?;
    backend.call(&mut (), "env", "call", &[WasmValue::I32(250)])?;

    let wasm = wat::parse_str(RECURSION)?;
    let mut backend = Backend::<(), E, F>::with_options(&wasm, too_deep)?;
    backend.set_memory_allocator(WasmAllocator::new());
    assert!(matches!(backend.initialize(&mut (), None), Err(Error::InvalidOptions(_))));
    Ok(())
}

fn reusable_after_traps<E: ExecutionStrategy, F: FloatPolicy>() -> Result<()> {
    let mut backend = backend::<E, F>(Options::with_max_call_depth(10))?;

    assert!(backend.call(&mut (), "env", "call.indirect.host", &[WasmValue::I32(100)]).is_err());
    assert_eq!(backend.call_depth(), 0);

    let err = backend.call_with_return(&mut (), "env", "trap", &[WasmValue::I32(0)]).unwrap_err();
    assert_eq!(err.trap(), Some(&Trap::DivisionByZero));
    assert_eq!(backend.call_depth(), 0);

    assert_eq!(backend.call_with_return(&mut (), "env", "trap", &[WasmValue::I32(1)])?, Some(WasmValue::I32(1)));
    backend.call(&mut (), "env", "call", &[WasmValue::I32(9)])?;
    assert_eq!(backend.call_depth(), 0);
    Ok(())
}

macro_rules! for_every_backend {
    ($($name:ident => $check:ident),* $(,)?) => {
        $(
            mod $name {
                use super::*;

                #[test]
                fn interpreter_soft() -> Result<()> {
                    $check::<Interpreter, SoftFloat>()
                }

                #[test]
                fn interpreter_hard() -> Result<()> {
                    $check::<Interpreter, HardFloat>()
                }

                #[test]
                fn jit_soft() -> Result<()> {
                    $check::<Jit, SoftFloat>()
                }

                #[test]
                fn jit_hard() -> Result<()> {
                    $check::<Jit, HardFloat>()
                }
            }
        )*
    };
}

for_every_backend! {
    default_call_depth => default_ceiling,
    dynamic_call_depth => reconfigured_ceiling,
    reuse_after_trap => reusable_after_traps,
    max_call_depth => deepest_supported_ceiling,
    oversized_call_depth => oversized_ceiling_is_refused,
}

#[test]
fn reentrant_calls_share_the_ceiling() -> Result<()> {
    // a host function that calls back into the module takes one unit, and so does the re-entry
    let wasm = wat::parse_str(
        r#"(module
            (import "env" "reenter" (func $reenter (param i32)))
            (func $down (export "down") (param i32)
              (if (local.get 0) (then (call $reenter (i32.sub (local.get 0) (i32.const 1)))))))"#,
    )?;

    let mut imports = Imports::new();
    imports.define(
        "env",
        "reenter",
        HostFunction::typed::<i32, ()>(|caller, n| {
            caller.call("down", &[WasmValue::I32(n)])?;
            Ok(())
        }),
    )?;

    fn run<E: ExecutionStrategy>(wasm: &[u8], imports: Imports<()>) -> Result<()> {
        let mut backend = Backend::<(), E, SoftFloat>::with_options(wasm, Options::with_max_call_depth(21))?;
        backend.set_memory_allocator(WasmAllocator::new());
        backend.set_imports(imports);
        backend.initialize(&mut (), None)?;

        // every level is one wasm frame and one host frame: 1 + 2 * 10 = 21
        backend.call(&mut (), "env", "down", &[WasmValue::I32(10)])?;
        let err = backend.call(&mut (), "env", "down", &[WasmValue::I32(11)]).unwrap_err();
        assert!(matches!(err, Error::Trap(Trap::CallDepthExceeded { max_depth: 21 })));
        assert_eq!(backend.call_depth(), 0);
        Ok(())
    }

    run::<Interpreter>(&wasm, imports.clone())?;
    run::<Jit>(&wasm, imports)
}
