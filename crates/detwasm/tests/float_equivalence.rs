use detwasm::types::{ValType, WasmValue};
use detwasm::{
    Backend, ExecutionStrategy, FloatPolicy, HardFloat, Interpreter, Jit, Options, SoftFloat, WasmAllocator,
};
use eyre::Result;

const F32_SPECIALS: &[u32] = &[
    0x0000_0000, // +0
    0x8000_0000, // -0
    0x3f80_0000, // 1
    0xbf80_0000, // -1
    0x3f00_0000, // 0.5
    0x3fc0_0000, // 1.5
    0x4020_0000, // 2.5
    0xc020_0000, // -2.5
    0x0000_0001, // smallest subnormal
    0x807f_ffff, // largest negative subnormal
    0x0080_0000, // smallest normal
    0x7f7f_ffff, // max
    0x4f00_0000, // 2^31
    0xcf00_0000, // -2^31
    0x5f80_0000, // 2^64
    0x7f80_0000, // +inf
    0xff80_0000, // -inf
    0x7fc0_0000, // canonical NaN
    0xffc0_1234, // negative quiet NaN with payload
    0x7f80_0001, // signalling NaN
];

const F64_SPECIALS: &[u64] = &[
    0x0000_0000_0000_0000,
    0x8000_0000_0000_0000,
    0x3ff0_0000_0000_0000,
    0xbff0_0000_0000_0000,
    0x3fe0_0000_0000_0000,
    0x3ff8_0000_0000_0000,
    0x4004_0000_0000_0000,
    0xc004_0000_0000_0000,
    0x0000_0000_0000_0001,
    0x800f_ffff_ffff_ffff,
    0x0010_0000_0000_0000,
    0x7fef_ffff_ffff_ffff,
    0x41e0_0000_0000_0000, // 2^31
    0xc1e0_0000_0020_0000, // just below -2^31 - 1
    0x43e0_0000_0000_0000, // 2^63
    0x3690_0000_0000_0000, // below the f32 subnormal range
    0x47ef_ffff_f000_0000, // rounds to f32 infinity
    0x7ff0_0000_0000_0000,
    0xfff0_0000_0000_0000,
    0x7ff8_0000_0000_0000,
    0xfff8_0000_dead_0000,
    0x7ff0_0000_0000_0001,
];

const INT_SPECIALS: &[i64] = &[
    0,
    1,
    -1,
    i32::MAX as i64,
    i32::MIN as i64,
    u32::MAX as i64,
    16_777_217,
    9_007_199_254_740_993,
    i64::MAX,
    i64::MIN,
    -0x7fff_ff7f_ffff_ffff,
];

const BINARY: &[&str] = &["add", "sub", "mul", "div", "min", "max", "copysign"];
const UNARY: &[&str] = &["abs", "neg", "sqrt", "ceil", "floor", "trunc", "nearest"];
const COMPARE: &[&str] = &["eq", "ne", "lt", "gt", "le", "ge"];
const FROM_FLOAT: &[&str] = &["trunc", "trunc_sat"];

/// One function per opcode, exported under the opcode's name.
fn float_module() -> String {
    let mut wat = String::from("(module\n");
    let mut func = |name: String, params: &str, result: &str, body: String| {
        wat.push_str(&format!("(func (export \"{name}\") (param {params}) (result {result}) {body})\n"));
    };

    for t in ["f32", "f64"] {
        for op in BINARY {
            func(format!("{t}.{op}"), &format!("{t} {t}"), t, format!("({t}.{op} (local.get 0) (local.get 1))"));
        }
        for op in COMPARE {
            func(format!("{t}.{op}"), &format!("{t} {t}"), "i32", format!("({t}.{op} (local.get 0) (local.get 1))"));
        }
        for op in UNARY {
            func(format!("{t}.{op}"), t, t, format!("({t}.{op} (local.get 0))"));
        }
        for int in ["i32", "i64"] {
            for op in FROM_FLOAT {
                for sign in ["s", "u"] {
                    let name = format!("{int}.{op}_{t}_{sign}");
                    func(name.clone(), t, int, format!("({name} (local.get 0))"));
                }
            }
            for sign in ["s", "u"] {
                let name = format!("{t}.convert_{int}_{sign}");
                func(name.clone(), int, t, format!("({name} (local.get 0))"));
            }
        }
    }

    func("f32.demote_f64".into(), "f64", "f32", "(f32.demote_f64 (local.get 0))".into());
    func("f64.promote_f32".into(), "f32", "f64", "(f64.promote_f32 (local.get 0))".into());
    func(
        "scenario".into(),
        "f64",
        "i64",
        "(i64.extend_i32_u (i32.reinterpret_f32 (f32.demote_f64 (local.get 0))))".into(),
    );

    wat.push_str(DEMOTE_SWEEP);
    wat.push(')');
    wat
}

/// Demotes `(i << 48) + j` for every `i` in `0..65536` and `j` in `-1..=1`, folding the results
/// into a hash with [`fold_demoted`].
const DEMOTE_SWEEP: &str = r#"
(func (export "demote_sweep") (result i32) (local $i i64) (local $j i64) (local $hash i32)
  (loop $outer
    (local.set $j (i64.const -1))
    (loop $inner
      (local.set $hash
        (i32.xor
          (i32.rotl (local.get $hash) (i32.const 5))
          (i32.reinterpret_f32
            (f32.demote_f64 (f64.reinterpret_i64 (i64.add (i64.shl (local.get $i) (i64.const 48)) (local.get $j)))))))
      (local.set $j (i64.add (local.get $j) (i64.const 1)))
      (br_if $inner (i64.le_s (local.get $j) (i64.const 1))))
    (local.set $i (i64.add (local.get $i) (i64.const 1)))
    (br_if $outer (i64.lt_u (local.get $i) (i64.const 65536))))
  (local.get $hash))
"#;

fn fold_demoted(hash: u32, demoted: u32) -> u32 {
    hash.rotate_left(5) ^ demoted
}

/// The four combinations of strategy and float policy, loaded with the same module.
struct Backends {
    interpreter_soft: Backend<(), Interpreter, SoftFloat>,
    interpreter_hard: Backend<(), Interpreter, HardFloat>,
    jit_soft: Backend<(), Jit, SoftFloat>,
    jit_hard: Backend<(), Jit, HardFloat>,
}

fn load<E: ExecutionStrategy, F: FloatPolicy>(wasm: &[u8]) -> Result<Backend<(), E, F>> {
    let mut backend = Backend::with_options(wasm, Options::default())?;
    backend.set_memory_allocator(WasmAllocator::new());
    backend.initialize(&mut (), None)?;
    Ok(backend)
}

/// A result reduced to something comparable: the value bits, or the trap message.
type Outcome = std::result::Result<(ValType, u64), &'static str>;

fn outcome(result: detwasm::Result<Option<WasmValue>>) -> Outcome {
    match result {
        Ok(Some(value)) => Ok((value.val_type(), value.to_bits())),
        Ok(None) => Err("no result"),
        Err(err) => Err(err.trap().map(|trap| trap.message()).unwrap_or("not a trap")),
    }
}

impl Backends {
    fn new() -> Result<Self> {
        let _ = pretty_env_logger::try_init();
        let wasm = wat::parse_str(float_module())?;
        Ok(Self {
            interpreter_soft: load(&wasm)?,
            interpreter_hard: load(&wasm)?,
            jit_soft: load(&wasm)?,
            jit_hard: load(&wasm)?,
        })
    }

    /// Run `name` under all four combinations and check that they agree.
    fn run(&mut self, name: &str, args: &[WasmValue]) -> Outcome {
        let outcomes = [
            outcome(self.interpreter_soft.call_with_return(&mut (), "env", name, args)),
            outcome(self.interpreter_hard.call_with_return(&mut (), "env", name, args)),
            outcome(self.jit_soft.call_with_return(&mut (), "env", name, args)),
            outcome(self.jit_hard.call_with_return(&mut (), "env", name, args)),
        ];

        assert!(
            outcomes.iter().all(|outcome| *outcome == outcomes[0]),
            "{name}{args:?} diverged: {outcomes:x?}"
        );
        outcomes[0]
    }

    /// Like [`Backends::run`], for inputs where only the agreement matters.
    fn agree(&mut self, name: &str, args: &[WasmValue]) {
        let _ = self.run(name, args);
    }
}

fn f32(bits: u32) -> WasmValue {
    WasmValue::from_bits(ValType::F32, bits as u64)
}

fn f64(bits: u64) -> WasmValue {
    WasmValue::from_bits(ValType::F64, bits)
}

fn is_nan32(bits: u64) -> bool {
    bits & 0x7f80_0000 == 0x7f80_0000 && bits & 0x007f_ffff != 0
}

fn is_nan64(bits: u64) -> bool {
    bits & 0x7ff0_0000_0000_0000 == 0x7ff0_0000_0000_0000 && bits & 0x000f_ffff_ffff_ffff != 0
}

#[test]
fn binary_ops_agree_on_special_values() -> Result<()> {
    let mut backends = Backends::new()?;

    for op in BINARY.iter().chain(COMPARE) {
        for &a in F32_SPECIALS {
            for &b in F32_SPECIALS {
                let result = backends.run(&format!("f32.{op}"), &[f32(a), f32(b)]);
                if BINARY.contains(op) && *op != "copysign" && (is_nan32(a as u64) || is_nan32(b as u64)) {
                    assert!(is_nan32(result.unwrap().1), "f32.{op}({a:#x}, {b:#x}) is not NaN");
                }
            }
        }

        for &a in F64_SPECIALS {
            for &b in F64_SPECIALS {
                let result = backends.run(&format!("f64.{op}"), &[f64(a), f64(b)]);
                if BINARY.contains(op) && *op != "copysign" && (is_nan64(a) || is_nan64(b)) {
                    assert!(is_nan64(result.unwrap().1), "f64.{op}({a:#x}, {b:#x}) is not NaN");
                }
            }
        }
    }

    Ok(())
}

#[test]
fn unary_ops_and_conversions_agree_on_special_values() -> Result<()> {
    let mut backends = Backends::new()?;

    for &a in F32_SPECIALS {
        for op in UNARY {
            backends.agree(&format!("f32.{op}"), &[f32(a)]);
        }
        for int in ["i32", "i64"] {
            for op in FROM_FLOAT {
                for sign in ["s", "u"] {
                    backends.agree(&format!("{int}.{op}_f32_{sign}"), &[f32(a)]);
                }
            }
        }
        backends.agree("f64.promote_f32", &[f32(a)]);
    }

    for &a in F64_SPECIALS {
        for op in UNARY {
            backends.agree(&format!("f64.{op}"), &[f64(a)]);
        }
        for int in ["i32", "i64"] {
            for op in FROM_FLOAT {
                for sign in ["s", "u"] {
                    backends.agree(&format!("{int}.{op}_f64_{sign}"), &[f64(a)]);
                }
            }
        }
        backends.agree("f32.demote_f64", &[f64(a)]);
    }

    for &int in INT_SPECIALS {
        for t in ["f32", "f64"] {
            for sign in ["s", "u"] {
                backends.agree(&format!("{t}.convert_i32_{sign}"), &[WasmValue::I32(int as i32)]);
                backends.agree(&format!("{t}.convert_i64_{sign}"), &[WasmValue::I64(int)]);
            }
        }
    }

    Ok(())
}

#[test]
fn invalid_truncations_trap_identically() -> Result<()> {
    let mut backends = Backends::new()?;

    assert_eq!(backends.run("i32.trunc_f32_s", &[f32(0x7fc0_0000)]), Err("invalid conversion to integer"));
    assert_eq!(backends.run("i32.trunc_f32_s", &[f32(0x4f00_0000)]), Err("integer overflow"));
    assert_eq!(backends.run("i64.trunc_f64_u", &[f64(0xbff0_0000_0000_0000)]), Err("integer overflow"));
    assert_eq!(backends.run("i32.trunc_sat_f32_s", &[f32(0x7fc0_0000)]), Ok((ValType::I32, 0)));
    assert_eq!(
        backends.run("i32.trunc_sat_f32_s", &[f32(0xff80_0000)]),
        Ok((ValType::I32, i32::MIN as u32 as u64))
    );
    Ok(())
}

#[test]
fn signed_zeros_order_in_min_and_max() -> Result<()> {
    let mut backends = Backends::new()?;

    assert_eq!(backends.run("f32.min", &[f32(0x0000_0000), f32(0x8000_0000)]), Ok((ValType::F32, 0x8000_0000)));
    assert_eq!(backends.run("f32.min", &[f32(0x8000_0000), f32(0x0000_0000)]), Ok((ValType::F32, 0x8000_0000)));
    assert_eq!(backends.run("f32.max", &[f32(0x0000_0000), f32(0x8000_0000)]), Ok((ValType::F32, 0)));
    assert_eq!(backends.run("f32.max", &[f32(0x8000_0000), f32(0x0000_0000)]), Ok((ValType::F32, 0)));

    let negative_zero = 0x8000_0000_0000_0000;
    assert_eq!(backends.run("f64.min", &[f64(0), f64(negative_zero)]), Ok((ValType::F64, negative_zero)));
    assert_eq!(backends.run("f64.max", &[f64(negative_zero), f64(0)]), Ok((ValType::F64, 0)));
    Ok(())
}

#[test]
fn nan_payloads_propagate_identically() -> Result<()> {
    let mut backends = Backends::new()?;

    // the first NaN operand wins and is quieted
    assert_eq!(backends.run("f32.add", &[f32(0x7f80_0001), f32(0x3f80_0000)]), Ok((ValType::F32, 0x7fc0_0001)));
    assert_eq!(backends.run("f32.min", &[f32(0xffc0_1234), f32(0x7fc0_0000)]), Ok((ValType::F32, 0xffc0_1234)));
    assert_eq!(backends.run("f32.mul", &[f32(0x3f80_0000), f32(0xffc0_1234)]), Ok((ValType::F32, 0xffc0_1234)));

    // invalid operations produce the canonical NaN
    assert_eq!(backends.run("f32.sub", &[f32(0x7f80_0000), f32(0x7f80_0000)]), Ok((ValType::F32, 0x7fc0_0000)));
    assert_eq!(
        backends.run("f64.div", &[f64(0), f64(0)]),
        Ok((ValType::F64, 0x7ff8_0000_0000_0000))
    );
    Ok(())
}

#[test]
fn demotion_sweep_agrees_through_the_backends() -> Result<()> {
    let mut backends = Backends::new()?;

    for i in (0u64..65536).step_by(97).chain([0x3800, 0x3810, 0x47e0, 0x47f0, 0x7fef, 0x7ff0, 0xffff]) {
        for j in -1i64..=1 {
            let bits = (i << 48).wrapping_add(j as u64);
            backends.agree("f32.demote_f64", &[f64(bits)]);
        }
    }

    Ok(())
}

#[test]
fn full_demotion_sweep_runs_identically_in_every_backend() -> Result<()> {
    let mut backends = Backends::new()?;

    let mut expected = 0u32;
    for i in 0u64..65536 {
        for j in -1i64..=1 {
            expected = fold_demoted(expected, SoftFloat::f32_demote((i << 48).wrapping_add(j as u64)));
        }
    }

    assert_eq!(backends.run("demote_sweep", &[]), Ok((ValType::I32, expected as u64)));
    Ok(())
}

#[test]
fn demotion_sweep_agrees_between_policies() {
    for i in 0u64..65536 {
        for j in -1i64..=1 {
            let bits = (i << 48).wrapping_add(j as u64);
            assert_eq!(SoftFloat::f32_demote(bits), HardFloat::f32_demote(bits), "demote({bits:#018x})");
        }
    }
}

#[test]
fn demote_reinterpret_extend_scenario() -> Result<()> {
    let mut backends = Backends::new()?;

    // a tiny subnormal demotes to +0
    let result = backends.run("scenario", &[f64(0x0000_8000_0000_0001)]);
    assert_eq!(result, Ok((ValType::I64, 0)));

    let result = backends.run("scenario", &[f64(0x3ff0_0000_0000_0000)]);
    assert_eq!(result, Ok((ValType::I64, 0x3f80_0000)));
    Ok(())
}
