use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stackwasm::error::BoxError;
use stackwasm::model::ExternalKind;
use stackwasm::{decode, validate, Debugger, ImportResolver, Module, ValidatedModule, Vm, VmConfig};

#[derive(Parser)]
#[command(name = "stackwasm-run", about = "Run the zero-argument exports of a wasm module")]
struct Cli {
    /// Module to run. Imports named `m` are loaded from `m.wasm` in the same directory.
    file: PathBuf,

    /// Decode and validate the module, report the result and exit without running anything.
    #[arg(long)]
    verify: bool,

    /// Stop at offset 0 of every function and read debugger commands from stdin.
    #[arg(short, long)]
    debug: bool,

    /// Instruction budget per instance.
    #[arg(long)]
    fuel: Option<u64>,

    /// Maximum call depth.
    #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
    max_call_depth: usize,
}

/// Resolves an import module name to `<dir>/<name>.wasm`, decoded with the same rules.
struct FileResolver {
    dir: PathBuf,
    /// Modules being decoded, outermost first.
    loading: Vec<String>,
}

impl FileResolver {
    fn new(dir: PathBuf, root: Option<&str>) -> Self {
        Self {
            dir,
            loading: root.map(str::to_string).into_iter().collect(),
        }
    }
}

impl ImportResolver for FileResolver {
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, BoxError> {
        if self.loading.iter().any(|m| m == name) {
            let chain = self.loading.join(" -> ");
            return Err(anyhow::anyhow!("import cycle: {chain} -> {name}").into());
        }
        let path = self.dir.join(format!("{name}.wasm"));
        let bytes = std::fs::read(&path)?;
        self.loading.push(name.to_string());
        let module = decode(&bytes, self);
        self.loading.pop();
        let module = module?;
        tracing::debug!(path = %path.display(), "loaded import");
        Ok(Arc::new(module))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bytes =
        std::fs::read(&cli.file).with_context(|| format!("reading {}", cli.file.display()))?;
    let dir = cli
        .file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let root = cli.file.file_stem().and_then(|s| s.to_str());
    let module =
        decode(&bytes, &mut FileResolver::new(dir, root)).context("could not read module")?;
    if module.exports.is_empty() {
        anyhow::bail!("module has no exports");
    }

    let module = validate(module).context("could not verify module")?;
    if cli.verify {
        let m = module.module();
        println!(
            "{}: ok ({} functions, {} exports)",
            cli.file.display(),
            m.functions.len(),
            m.exports.len()
        );
        return Ok(());
    }

    let mut config = VmConfig::default().with_max_call_depth(cli.max_call_depth);
    config.fuel = cli.fuel;
    run_exports(&module, &config, cli.debug)
}

fn instantiate(module: &ValidatedModule, config: &VmConfig, debug: bool) -> anyhow::Result<Vm> {
    let mut vm = Vm::instantiate(module.clone(), config.clone()).context("could not create VM")?;
    if debug {
        vm.set_debug_hook(attach_debugger());
    }
    Ok(vm)
}

/// Invoke every export that takes no arguments, printing each result. A trapping export does
/// not stop the rest; the instance is recreated for the next one.
fn run_exports(module: &ValidatedModule, config: &VmConfig, debug: bool) -> anyhow::Result<()> {
    let mut vm = instantiate(module, config, debug)?;
    let m = module.module();
    for (name, export) in &m.exports {
        if export.kind != ExternalKind::Function {
            continue;
        }
        let Some(ty) = m.func_type(export.index) else {
            continue;
        };
        if !ty.params.is_empty() {
            tracing::warn!(export = %name, "skipping export with parameters");
            continue;
        }
        let label = match ty.results.first() {
            Some(result) => format!("{name}() {result}"),
            None => format!("{name}()"),
        };
        if vm.is_poisoned() {
            vm = instantiate(module, config, debug)?;
        }
        match vm.invoke(export.index, &[]) {
            Ok(results) => match results.first() {
                Some(v) => println!("{label} => {v}"),
                None => println!("{label} =>"),
            },
            Err(err) => println!("{label} => error: {err}"),
        }
    }
    Ok(())
}

/// Debugger stopping at offset 0, served by a thread that relays between stdin and stdout.
fn attach_debugger() -> Debugger {
    let (debugger, handle) = Debugger::new();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        while let Ok(msg) = handle.recv() {
            println!("{msg}");
            print!("> ");
            let _ = std::io::stdout().flush();
            let line = match lines.next() {
                Some(Ok(line)) => line,
                _ => "continue".to_string(),
            };
            if handle.send(line).is_err() {
                break;
            }
        }
    });
    debugger.with_breakpoint(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A module whose only import is function `f` of module `target`.
    fn importing(target: &str) -> Vec<u8> {
        let mut imports = vec![0x01, target.len() as u8];
        imports.extend_from_slice(target.as_bytes());
        imports.extend_from_slice(&[0x01, b'f', 0x00, 0x00]);
        let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        bytes.push(0x02);
        bytes.push(imports.len() as u8);
        bytes.extend(imports);
        bytes
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stackwasm-run-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn import_cycles_are_reported() {
        let dir = scratch_dir("cycle");
        std::fs::write(dir.join("a.wasm"), importing("b")).unwrap();
        std::fs::write(dir.join("b.wasm"), importing("a")).unwrap();

        let err = FileResolver::new(dir.clone(), Some("main"))
            .resolve("a")
            .unwrap_err();
        let chain: Vec<String> = {
            let mut out = vec![err.to_string()];
            let mut source = err.source();
            while let Some(e) = source {
                out.push(e.to_string());
                source = e.source();
            }
            out
        };
        assert!(
            chain.iter().any(|m| m == "import cycle: main -> a -> b -> a"),
            "{chain:?}"
        );

        std::fs::write(dir.join("self.wasm"), importing("self")).unwrap();
        let err = FileResolver::new(dir.clone(), Some("self"))
            .resolve("self")
            .unwrap_err();
        assert_eq!(err.to_string(), "import cycle: self -> self");

        std::fs::remove_dir_all(dir).unwrap();
    }
}
