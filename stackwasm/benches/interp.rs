use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackwasm::{decode, validate, NoImports, Value, Vm};

const PROGRAMS: &str = r#"(module
    (func $fib (export "fib") (param $n i32) (result i32)
        (if (result i32) (i32.lt_u (local.get $n) (i32.const 2))
            (then (local.get $n))
            (else
                (i32.add
                    (call $fib (i32.sub (local.get $n) (i32.const 1)))
                    (call $fib (i32.sub (local.get $n) (i32.const 2)))))))
    (func (export "count") (param $n i32) (result i64) (local $i i32) (local $acc i64)
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
                (local.set $acc (i64.add (local.get $acc) (i64.extend_i32_u (local.get $i))))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $next)))
        local.get $acc))"#;

fn instance() -> Vm {
    let bytes = wat::parse_str(PROGRAMS).expect("benchmark module assembles");
    let module = decode(&bytes, &mut NoImports).expect("benchmark module decodes");
    Vm::new(validate(module).expect("benchmark module validates")).expect("instantiates")
}

fn bench_fib(c: &mut Criterion) {
    let mut vm = instance();
    let mut group = c.benchmark_group("fib");
    for &n in &[10i32, 20, 25] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let r = vm.invoke_export("fib", &[Value::I32(black_box(n))]).unwrap();
                black_box(r);
            })
        });
    }
    group.finish();
}

fn bench_loop(c: &mut Criterion) {
    let mut vm = instance();
    let mut group = c.benchmark_group("count");
    for &n in &[1_000i32, 100_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let r = vm.invoke_export("count", &[Value::I32(black_box(n))]).unwrap();
                black_box(r);
            })
        });
    }
    group.finish();
}

fn bench_decode_validate(c: &mut Criterion) {
    let bytes = wat::parse_str(PROGRAMS).expect("benchmark module assembles");
    c.bench_function("decode_validate", |b| {
        b.iter(|| {
            let module = decode(black_box(&bytes), &mut NoImports).unwrap();
            black_box(validate(module).unwrap());
        })
    });
}

criterion_group!(benches, bench_fib, bench_loop, bench_decode_validate);
criterion_main!(benches);
