use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use parser::{
    AssignTarget, ClassDecl, Expr, ExprKind, InterpolationPart, LogicalOp,
    MethodDecl, MethodKind, Stmt, call_signature, parse_module,
};

use crate::Vm;
use crate::error::{ErrorType, RuntimeError};
use crate::value::{Class, ForeignMethodFn, Instance, Method, Value, format_num};

/// Script methods may nest this deep before the fiber aborts.
pub const MAX_CALL_DEPTH: usize = 128;

/// Top-level variables of one module.
pub struct Module {
    pub name: Rc<str>,
    variables: RefCell<HashMap<String, Value>>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            variables: RefCell::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.variables.borrow().get(name).cloned()
    }

    pub fn define(&self, name: &str, value: Value) {
        self.variables.borrow_mut().insert(name.to_string(), value);
    }

    fn assign(&self, name: &str, value: Value) -> bool {
        match self.variables.borrow_mut().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break,
}

struct Frame {
    module: Rc<Module>,
    /// `None` at module level, where `this` is a compile-time error in the
    /// reference dialect and a runtime error here.
    this: Option<Value>,
    scopes: Vec<HashMap<String, Value>>,
    line: usize,
    function: String,
}

impl Frame {
    fn module(module: Rc<Module>) -> Self {
        Self {
            module,
            this: None,
            scopes: Vec::new(),
            line: 0,
            function: "(script)".to_string(),
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .or_else(|| self.module.get(name))
    }

    fn assign(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        self.module.assign(name, value)
    }

    fn declare(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => self.module.define(name, value),
        }
    }
}

fn stmt_line(stmt: &Stmt) -> Option<usize> {
    let line = match stmt {
        Stmt::Expr(expr) => expr.span.line(),
        Stmt::Var { span, .. }
        | Stmt::Return { span, .. }
        | Stmt::Break(span)
        | Stmt::Import { span, .. } => span.line(),
        Stmt::If { condition, .. } | Stmt::While { condition, .. } => {
            condition.span.line()
        }
        Stmt::For { sequence, .. } => sequence.span.line(),
        Stmt::Class(decl) => decl.span.line(),
        Stmt::Block(_) => return None,
    };
    Some(line)
}

impl Vm {
    pub(crate) fn module_or_new(&mut self, name: &str) -> Rc<Module> {
        if let Some(module) = self.modules.get(name) {
            return module.clone();
        }
        let module = Rc::new(Module::new(name));
        for class in self.core.all() {
            module.define(&class.name, Value::Class(class.clone()));
        }
        self.modules.insert(name.to_string(), module.clone());
        module
    }

    pub(crate) fn run_module(
        &mut self,
        module: &Rc<Module>,
        stmts: &[Stmt],
    ) -> Result<(), RuntimeError> {
        log::debug!("running module '{}'", module.name);
        let mut frame = Frame::module(module.clone());
        match self.exec_stmts(&mut frame, stmts) {
            Ok(_) => Ok(()),
            Err(mut err) => {
                err.push_frame(&frame.module.name, frame.line, &frame.function);
                Err(err)
            }
        }
    }

    fn exec_stmts(
        &mut self,
        frame: &mut Frame,
        stmts: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(
        &mut self,
        frame: &mut Frame,
        stmts: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        frame.scopes.push(HashMap::new());
        let flow = self.exec_stmts(frame, stmts);
        frame.scopes.pop();
        flow
    }

    fn exec(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        if let Some(line) = stmt_line(stmt) {
            frame.line = line;
        }
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
            }
            Stmt::Var { name, init, .. } => {
                let value = match init {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::Null,
                };
                frame.declare(name, value);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(frame, condition)?.is_truthy() {
                    return self.exec_scoped(frame, then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.exec_scoped(frame, else_branch);
                }
            }
            Stmt::While { condition, body } => loop {
                if !self.eval(frame, condition)?.is_truthy() {
                    break;
                }
                match self.exec_scoped(frame, body)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal => {}
                }
            },
            Stmt::For {
                name,
                sequence,
                body,
            } => {
                let items = match self.eval(frame, sequence)? {
                    Value::List(items) => {
                        let snapshot = items.borrow().clone();
                        snapshot
                    }
                    _ => {
                        return Err(RuntimeError::new(
                            "Only lists can be iterated.",
                        ));
                    }
                };
                for item in items {
                    frame.scopes.push(HashMap::from([(name.clone(), item)]));
                    let flow = self.exec(frame, body);
                    frame.scopes.pop();
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal => {}
                    }
                }
            }
            Stmt::Block(stmts) => return self.exec_block(frame, stmts),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Break(_) => return Ok(Flow::Break),
            Stmt::Class(decl) => {
                let module = frame.module.clone();
                let class = self.define_class(&module, decl)?;
                frame.declare(&decl.name, Value::Class(class));
            }
            Stmt::Import { module, names, .. } => {
                let into = frame.module.clone();
                self.import(module, names, &into)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Runs a branch or loop body in its own scope unless it already is a
    /// block.
    fn exec_scoped(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Block(stmts) => self.exec_block(frame, stmts),
            other => {
                frame.scopes.push(HashMap::new());
                let flow = self.exec(frame, other);
                frame.scopes.pop();
                flow
            }
        }
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Num(*n)),
            ExprKind::String(s) => Ok(Value::str(s)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Interpolation(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        InterpolationPart::Literal(s) => text.push_str(s),
                        InterpolationPart::Expr(expr) => {
                            let value = self.eval(frame, expr)?;
                            text.push_str(&self.stringify(value)?);
                        }
                    }
                }
                Ok(Value::Str(Rc::from(text)))
            }
            ExprKind::This => frame.this.clone().ok_or_else(|| {
                RuntimeError::new("Cannot use 'this' outside of a method.")
            }),
            ExprKind::Variable(name) => frame.lookup(name).ok_or_else(|| {
                RuntimeError::new(format!("Variable '{name}' is not defined."))
            }),
            ExprKind::Field(name) => match &frame.this {
                Some(Value::Instance(instance)) => Ok(instance.field(name)),
                _ => Err(RuntimeError::new(format!(
                    "Cannot read field '{name}' outside of an instance method."
                ))),
            },
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(frame, item)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(frame, operand)?;
                self.invoke(value, op, Vec::new())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(frame, lhs)?;
                let rhs = self.eval(frame, rhs)?;
                self.invoke(lhs, &call_signature(op, Some(1)), vec![rhs])
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let lhs = self.eval(frame, lhs)?;
                match (op, lhs.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(lhs),
                    _ => self.eval(frame, rhs),
                }
            }
            ExprKind::Assign { target, value } => {
                let value = self.eval(frame, value)?;
                match target {
                    AssignTarget::Variable(name) => {
                        if !frame.assign(name, value.clone()) {
                            return Err(RuntimeError::new(format!(
                                "Variable '{name}' is not defined."
                            )));
                        }
                    }
                    AssignTarget::Field(name) => match &frame.this {
                        Some(Value::Instance(instance)) => {
                            instance.set_field(name, value.clone());
                        }
                        _ => {
                            return Err(RuntimeError::new(format!(
                                "Cannot write field '{name}' outside of an instance method."
                            )));
                        }
                    },
                }
                Ok(value)
            }
            ExprKind::Call {
                receiver,
                name,
                args,
            } => {
                let receiver = self.eval(frame, receiver)?;
                let mut values = Vec::new();
                if let Some(args) = args {
                    for arg in args {
                        values.push(self.eval(frame, arg)?);
                    }
                }
                let signature = call_signature(name, args.as_ref().map(Vec::len));
                self.invoke(receiver, &signature, values)
            }
            ExprKind::Subscript { receiver, index } => {
                let receiver = self.eval(frame, receiver)?;
                let index = self.eval(frame, index)?;
                self.invoke(receiver, "[_]", vec![index])
            }
        }
    }

    /// Send `signature` to `receiver`. Class receivers dispatch to static
    /// methods and constructors.
    pub(crate) fn invoke(
        &mut self,
        receiver: Value,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let method = match &receiver {
            Value::Class(class) => class.find_static(signature),
            other => self.class_of(other).find(signature),
        };
        let Some(method) = method else {
            return self.fallback(receiver, signature, &args);
        };
        match method {
            Method::Primitive(func) => func(self, &receiver, &args),
            Method::Foreign(func) => self.call_foreign(func, receiver, args),
            Method::Script(decl) => {
                self.enter()?;
                let result = self.call_script(&decl, receiver, args);
                self.depth -= 1;
                result
            }
            Method::Constructor(decl) => {
                let Value::Class(class) = receiver else {
                    return Err(RuntimeError::new("Constructor called on a non-class."));
                };
                self.enter()?;
                let result = self.construct(class, &decl, args);
                self.depth -= 1;
                result
            }
        }
    }

    fn enter(&mut self) -> Result<(), RuntimeError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new("Stack overflow."));
        }
        self.depth += 1;
        Ok(())
    }

    /// Methods every object answers to when its class doesn't define them.
    fn fallback(
        &mut self,
        receiver: Value,
        signature: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match (signature, args) {
            ("==(_)", [other]) => Ok(Value::Bool(receiver.equals(other))),
            ("!=(_)", [other]) => Ok(Value::Bool(!receiver.equals(other))),
            ("!", []) => Ok(Value::Bool(!receiver.is_truthy())),
            ("toString", []) => Ok(Value::Str(Rc::from(describe(&receiver)))),
            ("type", []) => Ok(Value::Class(self.class_of(&receiver))),
            ("name", []) if matches!(receiver, Value::Class(_)) => {
                Ok(Value::Str(Rc::from(describe(&receiver))))
            }
            _ => Err(match &receiver {
                Value::Class(class) => RuntimeError::new(format!(
                    "{} metaclass does not implement '{signature}'.",
                    class.name
                )),
                other => RuntimeError::new(format!(
                    "{} does not implement '{signature}'.",
                    self.class_of(other).name
                )),
            }),
        }
    }

    pub(crate) fn class_of(&self, value: &Value) -> Rc<Class> {
        match value {
            Value::Null => self.core.null_class.clone(),
            Value::Bool(_) => self.core.bool_class.clone(),
            Value::Num(_) => self.core.num_class.clone(),
            Value::Str(_) => self.core.string_class.clone(),
            Value::List(_) => self.core.list_class.clone(),
            // Classes report themselves; there are no metaclass objects.
            Value::Class(class) => class.clone(),
            Value::Instance(instance) => instance.class.clone(),
            Value::Foreign(object) => object.class.clone(),
        }
    }

    fn call_script(
        &mut self,
        decl: &MethodDecl,
        receiver: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let class = self.class_of(&receiver);
        let module = self.module_or_new(&class.module);
        let mut scope = HashMap::with_capacity(decl.params.len());
        for (param, arg) in decl.params.iter().zip(args) {
            scope.insert(param.clone(), arg);
        }
        let mut frame = Frame {
            module,
            this: Some(receiver),
            scopes: vec![scope],
            line: decl.span.line(),
            function: format!("{}.{}", class.name, decl.signature()),
        };
        let body = decl.body.as_deref().unwrap_or_default();
        match self.exec_stmts(&mut frame, body) {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(_) if decl.kind == MethodKind::Constructor => {
                Ok(frame.this.unwrap_or(Value::Null))
            }
            Ok(_) => Ok(Value::Null),
            Err(mut err) => {
                err.push_frame(&frame.module.name, frame.line, &frame.function);
                Err(err)
            }
        }
    }

    fn construct(
        &mut self,
        class: Rc<Class>,
        decl: &MethodDecl,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let object = if class.is_foreign {
            let allocate = class.foreign_methods().allocate.ok_or_else(|| {
                RuntimeError::new(format!(
                    "Foreign class {} has no allocator.",
                    class.name
                ))
            })?;
            let object =
                self.call_foreign(allocate, Value::Class(class.clone()), args.clone())?;
            if !matches!(object, Value::Foreign(_)) {
                return Err(RuntimeError::new(format!(
                    "Allocator for foreign class {} did not create an object.",
                    class.name
                )));
            }
            object
        } else {
            Value::Instance(Rc::new(Instance::new(class)))
        };
        self.call_script(decl, object.clone(), args)?;
        Ok(object)
    }

    /// Run a host function with `receiver` and `args` in slots `0..=n`.
    /// Whatever the host leaves in slot 0 is the result; if it never
    /// writes slot 0 the result is null.
    pub(crate) fn call_foreign(
        &mut self,
        func: ForeignMethodFn,
        receiver: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let mut window = Vec::with_capacity(args.len() + 1);
        window.push(receiver);
        window.extend(args);
        let saved_slots = mem::replace(&mut self.slots, window);
        let saved_written = mem::replace(&mut self.return_written, false);
        let saved_abort = self.abort.take();

        func(self);

        let slots = mem::replace(&mut self.slots, saved_slots);
        let written = mem::replace(&mut self.return_written, saved_written);
        let aborted = mem::replace(&mut self.abort, saved_abort);
        if let Some(message) = aborted {
            return Err(RuntimeError::new(message));
        }
        Ok(match slots.into_iter().next() {
            Some(value) if written => value,
            _ => Value::Null,
        })
    }

    fn define_class(
        &mut self,
        module: &Rc<Module>,
        decl: &ClassDecl,
    ) -> Result<Rc<Class>, RuntimeError> {
        let class = Rc::new(Class::new(&decl.name, &module.name, decl.is_foreign));
        if decl.is_foreign {
            let methods = match self.config.bind_foreign_class_fn {
                Some(bind) => bind(self, &module.name, &decl.name),
                None => Default::default(),
            };
            if methods.allocate.is_none() {
                return Err(RuntimeError::new(format!(
                    "Could not find foreign class '{}' in module '{}'.",
                    decl.name, module.name
                )));
            }
            class.set_foreign_methods(methods);
        }

        for method in &decl.methods {
            let signature = method.signature();
            let body = if method.is_foreign {
                let bound = self.config.bind_foreign_method_fn.and_then(|bind| {
                    bind(self, &module.name, &decl.name, method.is_static, &signature)
                });
                match bound {
                    Some(func) => Method::Foreign(func),
                    None => {
                        return Err(RuntimeError::new(format!(
                            "Could not find foreign method '{signature}' for class {} in module '{}'.",
                            decl.name, module.name
                        )));
                    }
                }
            } else if method.kind == MethodKind::Constructor {
                Method::Constructor(method.clone())
            } else {
                Method::Script(method.clone())
            };
            if method.is_static || method.kind == MethodKind::Constructor {
                class.define_static(signature, body);
            } else {
                class.define(signature, body);
            }
        }
        log::debug!("defined class {} in module '{}'", decl.name, module.name);
        Ok(class)
    }

    fn import(
        &mut self,
        name: &str,
        names: &[String],
        into: &Rc<Module>,
    ) -> Result<(), RuntimeError> {
        let module = match self.modules.get(name) {
            Some(module) => module.clone(),
            None => self.load_module(name)?,
        };
        for var in names {
            let value = module.get(var).ok_or_else(|| {
                RuntimeError::new(format!(
                    "Could not find a variable named '{var}' in module '{name}'."
                ))
            })?;
            into.define(var, value);
        }
        Ok(())
    }

    fn load_module(&mut self, name: &str) -> Result<Rc<Module>, RuntimeError> {
        let source = self
            .config
            .load_module_fn
            .and_then(|load| load(self, name))
            .ok_or_else(|| RuntimeError::new(format!("Could not load module '{name}'.")))?;
        let stmts = parse_module(&source).map_err(|errors| {
            for err in &errors {
                self.report(ErrorType::Compile, name, err.line(), &err.message);
            }
            RuntimeError::new(format!("Could not compile module '{name}'."))
        })?;
        let module = self.module_or_new(name);
        self.run_module(&module, &stmts)?;
        Ok(module)
    }

    /// Convert a value to text, calling a user-defined `toString` if the
    /// class has one.
    pub(crate) fn stringify(&mut self, value: Value) -> Result<String, RuntimeError> {
        match &value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Num(n) => Ok(format_num(*n)),
            _ => match self.invoke(value.clone(), "toString", Vec::new())? {
                Value::Str(s) => Ok(s.to_string()),
                _ => Ok(describe(&value)),
            },
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Class(class) => class.name.to_string(),
        Value::Instance(instance) => format!("instance of {}", instance.class.name),
        Value::Foreign(object) => format!("instance of {}", object.class.name),
        other => format!("{other:?}"),
    }
}
