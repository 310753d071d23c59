//! Output, error reporting and module loading callbacks.

use std::fs;
use std::io::{self, Write};

use vm::{ErrorType, Vm};

use crate::binding;

pub(crate) fn write_output(vm: &mut Vm, text: &str) {
    let sink = binding::record_mut(vm).and_then(|r| r.out.as_mut());
    let result = match sink {
        Some(out) => out.write_all(text.as_bytes()),
        None => io::stdout().write_all(text.as_bytes()),
    };
    if let Err(err) = result {
        log::warn!("failed to write script output: {err}");
    }
}

pub(crate) fn format_error(kind: ErrorType, module: &str, line: usize, message: &str) -> String {
    match kind {
        ErrorType::Compile => format!("compilation error: {module}:{line}: {message}\n"),
        ErrorType::Runtime => format!("runtime error: {message}\n"),
        ErrorType::StackTrace => format!("\t{module}:{line}: {message}\n"),
    }
}

pub(crate) fn write_error(vm: &mut Vm, kind: ErrorType, module: &str, line: usize, message: &str) {
    let text = format_error(kind, module, line, message);
    let sink = binding::record_mut(vm).and_then(|r| r.err.as_mut());
    let result = match sink {
        Some(err) => err.write_all(text.as_bytes()),
        None => io::stderr().write_all(text.as_bytes()),
    };
    if let Err(err) = result {
        log::warn!("failed to write script error: {err}");
    }
}

/// Resolve `import "name"` to `<dir>/name.wren`, then
/// `<dir>/name/module.wren`. Names containing `..` are refused.
pub(crate) fn load_module(vm: &mut Vm, name: &str) -> Option<String> {
    if name.contains("..") {
        log::warn!("refusing to load module '{name}'");
        return None;
    }
    let dir = binding::record(vm)?.modules_dir.as_ref()?;
    let candidates = [
        dir.join(format!("{name}.wren")),
        dir.join(name).join("module.wren"),
    ];
    let found = candidates.iter().find_map(|path| {
        let source = fs::read_to_string(path).ok()?;
        log::trace!("loaded module '{name}' from {}", path.display());
        Some(source)
    });
    if found.is_none() {
        log::debug!("module '{name}' not found in {}", dir.display());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_formats() {
        assert_eq!(
            format_error(ErrorType::Compile, "main", 3, "Expected expression."),
            "compilation error: main:3: Expected expression.\n"
        );
        assert_eq!(
            format_error(ErrorType::Runtime, "", 0, "boom"),
            "runtime error: boom\n"
        );
        assert_eq!(
            format_error(ErrorType::StackTrace, "main", 7, "(script)"),
            "\tmain:7: (script)\n"
        );
    }

    #[test]
    fn parent_directories_are_refused() {
        let mut vm = Vm::new(Default::default());
        vm.set_user_data(binding::BoundVm::new(Some(".".into())));
        assert_eq!(load_module(&mut vm, "../secrets"), None);
    }
}
