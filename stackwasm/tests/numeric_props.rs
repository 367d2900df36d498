mod common;

use common::vm;
use proptest::prelude::*;
use stackwasm::{InvokeError, Trap, Value, Vm};

const ARITH: &str = r#"(module
    (func (export "add32") (param i32 i32) (result i32)
        (i32.add (local.get 0) (local.get 1)))
    (func (export "add64") (param i64 i64) (result i64)
        (i64.add (local.get 0) (local.get 1)))
    (func (export "shl32") (param i32 i32) (result i32)
        (i32.shl (local.get 0) (local.get 1)))
    (func (export "rotl64") (param i64 i64) (result i64)
        (i64.rotl (local.get 0) (local.get 1)))
    (func (export "div32") (param i32 i32) (result i32)
        (i32.div_s (local.get 0) (local.get 1)))
    (func (export "rem64") (param i64 i64) (result i64)
        (i64.rem_u (local.get 0) (local.get 1)))
    (func (export "cmp") (param f64 f64) (result i32)
        (i32.or
            (i32.or
                (i32.shl (f64.eq (local.get 0) (local.get 1)) (i32.const 0))
                (i32.shl (f64.ne (local.get 0) (local.get 1)) (i32.const 1)))
            (i32.or
                (i32.shl (f64.lt (local.get 0) (local.get 1)) (i32.const 2))
                (i32.shl (f64.ge (local.get 0) (local.get 1)) (i32.const 3))))))"#;

fn call(vm: &mut Vm, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
    let mut results = vm.invoke_export(name, args)?;
    Ok(results.pop().expect("function returns a value"))
}

proptest! {
    #[test]
    fn addition_wraps(a in any::<i32>(), b in any::<i32>(), c in any::<i64>(), d in any::<i64>()) {
        let mut vm = vm(ARITH);
        prop_assert_eq!(
            call(&mut vm, "add32", &[Value::I32(a), Value::I32(b)]).unwrap(),
            Value::I32(a.wrapping_add(b))
        );
        prop_assert_eq!(
            call(&mut vm, "add64", &[Value::I64(c), Value::I64(d)]).unwrap(),
            Value::I64(c.wrapping_add(d))
        );
    }

    #[test]
    fn shift_counts_are_taken_modulo_width(x in any::<i32>(), k in any::<i32>(), y in any::<i64>()) {
        let mut vm = vm(ARITH);
        let direct = call(&mut vm, "shl32", &[Value::I32(x), Value::I32(k)]).unwrap();
        let reduced = call(&mut vm, "shl32", &[Value::I32(x), Value::I32(k & 31)]).unwrap();
        prop_assert_eq!(direct, reduced);
        prop_assert_eq!(direct, Value::I32(x.wrapping_shl(k as u32)));
        prop_assert_eq!(
            call(&mut vm, "rotl64", &[Value::I64(y), Value::I64(k as i64)]).unwrap(),
            Value::I64(y.rotate_left((k as u32) % 64))
        );
    }

    #[test]
    fn division_matches_checked_semantics(a in any::<i32>(), b in any::<i32>()) {
        let mut vm = vm(ARITH);
        let result = call(&mut vm, "div32", &[Value::I32(a), Value::I32(b)]);
        match a.checked_div(b) {
            Some(q) => prop_assert_eq!(result.unwrap(), Value::I32(q)),
            None if b == 0 => prop_assert!(matches!(
                result,
                Err(InvokeError::Trap(Trap::IntegerDivideByZero))
            )),
            None => prop_assert!(matches!(result, Err(InvokeError::Trap(Trap::IntegerOverflow)))),
        }
    }

    #[test]
    fn unsigned_remainder(a in any::<u64>(), b in 1u64..) {
        let mut vm = vm(ARITH);
        prop_assert_eq!(
            call(&mut vm, "rem64", &[Value::I64(a as i64), Value::I64(b as i64)]).unwrap(),
            Value::I64((a % b) as i64)
        );
    }

    #[test]
    fn nan_is_unordered(x in any::<f64>()) {
        let mut vm = vm(ARITH);
        // only `ne` holds when either operand is NaN
        for args in [[Value::f64(f64::NAN), Value::f64(x)], [Value::f64(x), Value::f64(f64::NAN)]] {
            prop_assert_eq!(call(&mut vm, "cmp", &args).unwrap(), Value::I32(0b0010));
        }
    }

    #[test]
    fn comparisons_agree_with_ieee(x in -1e9f64..1e9, y in -1e9f64..1e9) {
        let mut vm = vm(ARITH);
        let expected = (x == y) as i32 | ((x != y) as i32) << 1 | ((x < y) as i32) << 2 | ((x >= y) as i32) << 3;
        prop_assert_eq!(
            call(&mut vm, "cmp", &[Value::f64(x), Value::f64(y)]).unwrap(),
            Value::I32(expected)
        );
    }
}

#[test]
fn shl_by_width_plus_one() {
    let mut vm = vm(ARITH);
    assert_eq!(
        call(&mut vm, "shl32", &[Value::I32(1), Value::I32(33)]).unwrap(),
        Value::I32(2)
    );
}
