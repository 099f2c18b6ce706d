//! Code builder: compile, then evaluate the program against the type table.

use std::sync::Arc;

use super::script::{Expr, Init, Program, Statement};
use super::{BuildCx, BuildError, Builder, Compiler, MAX_DEPTH, nesting_too_deep};
use crate::control::{Control, ControlTypes, Padding, PropValue};

pub struct CodeBuilder {
    compiler: Arc<dyn Compiler>,
}

impl CodeBuilder {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }
}

impl Builder for CodeBuilder {
    fn kind(&self) -> &'static str {
        "code"
    }

    fn create(&mut self, source: &str, cx: &BuildCx<'_>) -> Result<Control, BuildError> {
        let bytes = self
            .compiler
            .compile(source)
            .map_err(|diagnostics| BuildError::from_diagnostics(&diagnostics))?;
        let program = Program::from_bytes(&bytes).map_err(|e| {
            BuildError::new("compiler produced an unreadable program").with_detail(e.to_string())
        })?;
        evaluate(&program, cx.types)
    }
}

/// Run a program.
///
/// A lone expression statement is the result; otherwise assignments apply to
/// an implicit root `Panel`. Programs from external compilers are held to the
/// same `MAX_DEPTH` as parsed ones.
pub fn evaluate(program: &Program, types: &ControlTypes) -> Result<Control, BuildError> {
    if let [Statement::Expr(expr)] = program.statements.as_slice() {
        return eval_control(expr, types, 1);
    }

    let mut root = types
        .instantiate("Panel")
        .ok_or_else(|| BuildError::new("toolkit has no Panel type"))?;
    for statement in &program.statements {
        match statement {
            Statement::Assign(init) => apply(&mut root, init, types, 0)?,
            Statement::Expr(_) => {
                return Err(BuildError::new(
                    "an expression statement must be the only statement",
                ));
            }
        }
    }
    Ok(root)
}

/// `depth` is the nesting level of the control `expr` creates.
fn eval_control(expr: &Expr, types: &ControlTypes, depth: usize) -> Result<Control, BuildError> {
    let Expr::New { ty, init, pos } = expr else {
        return Err(BuildError::new("expected a control (`new Type { ... }`)"));
    };
    if depth > MAX_DEPTH {
        return Err(BuildError::located(nesting_too_deep(), pos.line, pos.column));
    }
    let mut control = types
        .instantiate(ty)
        .ok_or_else(|| BuildError::undefined(ty, pos.line, pos.column))?;
    for init in init {
        apply(&mut control, init, types, depth)?;
    }
    Ok(control)
}

fn apply(
    control: &mut Control,
    init: &Init,
    types: &ControlTypes,
    depth: usize,
) -> Result<(), BuildError> {
    let located = |message: String| BuildError::located(message, init.pos.line, init.pos.column);

    match (init.name.as_str(), &init.value) {
        ("Content", value) => {
            if !control.base.single_content() {
                return Err(located(format!("{} has no Content", control.kind)));
            }
            let child = eval_control(value, types, depth + 1)?;
            control.children = vec![child];
        }
        ("Items", Expr::List(items)) => {
            if !control.base.is_container() {
                return Err(located(format!("{} has no Items", control.kind)));
            }
            control.children = items
                .iter()
                .map(|item| eval_control(item, types, depth + 1))
                .collect::<Result<_, _>>()?;
        }
        ("Items", _) => return Err(located("Items expects a list".to_string())),
        ("Padding", Expr::Int(n)) => {
            let n = i32::try_from(*n).map_err(|_| located(format!("padding {n} is out of range")))?;
            control.padding = Padding::uniform(n);
        }
        ("Padding", Expr::Str(text)) => {
            control.padding = Padding::parse(text)
                .ok_or_else(|| located(format!("invalid padding `{text}`")))?;
        }
        ("Padding", _) => return Err(located("Padding expects a number".to_string())),
        (name, Expr::Bool(v)) => {
            control.props.insert(name.to_string(), PropValue::Bool(*v));
        }
        (name, Expr::Int(v)) => {
            control.props.insert(name.to_string(), PropValue::Int(*v));
        }
        (name, Expr::Str(v)) => {
            control.props.insert(name.to_string(), PropValue::Str(v.clone()));
        }
        (name, _) => return Err(located(format!("{name} expects a scalar value"))),
    }
    Ok(())
}
