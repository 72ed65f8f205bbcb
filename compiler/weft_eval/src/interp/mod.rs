//! Tree-walking interpreter over [`Program`] statement trees.
//!
//! # Design
//!
//! Each call pushes a frame of function-scoped locals. A `Def` (re)binds
//! its symbol to the type's default value; aggregates get a fresh heap
//! object. References point at a frame-local slot or an object field.
//!
//! A for-loop that reaches the interpreter unlowered is run naively: the
//! iterator body executes in its own frame, and each `yield` stores the
//! value into the loop index and runs the loop body in the consuming frame.
//! This is the reference semantics lowered code is compared against.

use rustc_hash::FxHashMap;
use weft_ir::{
    BlockInfo, Expr, FieldRef, FnFlags, FnId, Lit, Name, Operand, PrimOp, Program, StmtId,
    StmtKind, SymId, TypeId, TypeKind,
};

use crate::errors::{type_error, unsupported, EvalError, EvalResult};
use crate::value::{Heap, ObjId, Place, Value};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

/// Resource limits for one evaluator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    pub max_steps: u64,
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_steps: 1_000_000,
            max_depth: 512,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct YieldTarget {
    frame: usize,
    index: SymId,
    body: StmtId,
}

#[derive(Debug)]
struct Frame {
    func: FnId,
    locals: FxHashMap<SymId, Value>,
    yield_to: Option<YieldTarget>,
}

impl Frame {
    fn new(func: FnId) -> Self {
        Frame {
            func,
            locals: FxHashMap::default(),
            yield_to: None,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum Flow {
    Normal,
    Return(Value),
    Goto(SymId),
}

pub struct Evaluator<'p> {
    program: &'p Program,
    config: EvalConfig,
    heap: Heap,
    frames: Vec<Frame>,
    output: Vec<Value>,
    calls: FxHashMap<FnId, usize>,
    steps: u64,
}

impl<'p> Evaluator<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, EvalConfig::default())
    }

    pub fn with_config(program: &'p Program, config: EvalConfig) -> Self {
        Evaluator {
            program,
            config,
            heap: Heap::default(),
            frames: Vec::new(),
            output: Vec::new(),
            calls: FxHashMap::default(),
            steps: 0,
        }
    }

    // Public API

    pub fn run(&mut self, func: FnId, args: &[Value]) -> EvalResult<Value> {
        self.call(func, args.to_vec())
    }

    /// Run the zero-argument function `name`.
    pub fn run_named(&mut self, name: &str) -> EvalResult<Value> {
        let func = self
            .program
            .find_fn(name)
            .ok_or_else(|| unsupported(format!("no function named `{name}`")))?;
        self.call(func, Vec::new())
    }

    /// Values passed to the `trace` extern, in order.
    pub fn output(&self) -> &[Value] {
        &self.output
    }

    /// Integer view of [`Self::output`]; non-integers are skipped.
    pub fn output_ints(&self) -> Vec<i64> {
        self.output.iter().filter_map(|v| v.as_int()).collect()
    }

    /// Number of times `func` was entered.
    pub fn call_count(&self, func: FnId) -> usize {
        self.calls.get(&func).copied().unwrap_or(0)
    }

    pub fn objects_allocated(&self) -> usize {
        self.heap.len()
    }

    // Calls

    fn call(&mut self, func: FnId, args: Vec<Value>) -> EvalResult<Value> {
        *self.calls.entry(func).or_default() += 1;
        let program = self.program;
        let def = program.func(func);
        if def.flags.contains(FnFlags::EXTERN) {
            return self.call_extern(func, args);
        }
        if def.is_iterator() {
            return self.build_instance_record(func, &args);
        }
        if self.frames.len() >= self.config.max_depth {
            return Err(EvalError::DepthLimit(self.config.max_depth));
        }
        let mut frame = Frame::new(func);
        for (&formal, arg) in def.formals.iter().zip(args) {
            frame.locals.insert(formal, arg);
        }
        self.frames.push(frame);
        let depth = self.frames.len() - 1;
        let result = self.exec_stmt(depth, def.body);
        let frame = self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(def
                .ret_sym
                .and_then(|ret| frame.and_then(|f| f.locals.get(&ret).copied()))
                .unwrap_or(Value::Void)),
            Flow::Goto(label) => Err(EvalError::MissingLabel(
                program.sym_name(label).to_owned(),
            )),
        }
    }

    fn call_extern(&mut self, func: FnId, args: Vec<Value>) -> EvalResult<Value> {
        match self.program.fn_name(func) {
            "trace" => {
                self.output.extend(args);
                Ok(Value::Void)
            }
            other => Err(unsupported(format!("extern function `{other}`"))),
        }
    }

    /// Calling an iterator function captures its arguments in a fresh
    /// instance record.
    fn build_instance_record(&mut self, func: FnId, args: &[Value]) -> EvalResult<Value> {
        let program = self.program;
        let info = program.func(func).iterator_info.as_ref().ok_or_else(|| {
            unsupported(format!(
                "iterator `{}` has no instance record",
                program.fn_name(func)
            ))
        })?;
        let record = self.default_value(info.irecord);
        let Value::Obj(obj) = record else {
            return Err(type_error("record", &record));
        };
        let header = program.ty(info.irecord).header_fields as usize;
        let fields = &mut self.heap.get_mut(obj).fields;
        for (i, arg) in args.iter().enumerate() {
            if let Some(slot) = fields.get_mut(header + i) {
                *slot = *arg;
            }
        }
        Ok(record)
    }

    // Statements

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(EvalError::StepLimit(self.config.max_steps));
        }
        Ok(())
    }

    fn exec_seq(&mut self, frame: usize, body: &[StmtId]) -> EvalResult<Flow> {
        let program = self.program;
        let mut i = 0;
        while i < body.len() {
            match self.exec_stmt(frame, body[i])? {
                Flow::Normal => i += 1,
                Flow::Goto(label) => {
                    let target = body
                        .iter()
                        .position(|&s| matches!(program.kind(s), StmtKind::Def(l) if *l == label));
                    match target {
                        Some(pos) => i = pos + 1,
                        None => return Ok(Flow::Goto(label)),
                    }
                }
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, frame: usize, id: StmtId) -> EvalResult<Flow> {
        self.tick()?;
        let program = self.program;
        match program.kind(id) {
            StmtKind::Def(sym) => {
                if !program.sym(*sym).is_label() {
                    let value = self.default_value(program.sym_ty(*sym));
                    self.set_local(frame, *sym, value);
                }
            }
            StmtKind::Assign { dst, value } => {
                let value = self.eval_expr(frame, value)?;
                self.set_local(frame, *dst, value);
            }
            StmtKind::Store { ptr, value } => {
                let value = self.operand(frame, *value)?;
                match self.read(frame, *ptr)? {
                    Value::Ref(place) => self.store(place, value)?,
                    other => return Err(type_error("reference", &other)),
                }
            }
            StmtKind::SetMember { base, field, value } => {
                let value = self.operand(frame, *value)?;
                let obj = self.obj_of(frame, *base)?;
                let index = self.field_index(obj, *field)?;
                self.heap.get_mut(obj).fields[index as usize] = value;
            }
            StmtKind::Eval(expr) => {
                self.eval_expr(frame, expr)?;
            }
            StmtKind::Yield(op) => return self.exec_yield(frame, *op),
            StmtKind::Return(op) => return Ok(Flow::Return(self.operand(frame, *op)?)),
            StmtKind::Goto(label) => return Ok(Flow::Goto(*label)),
            StmtKind::Cond {
                cond,
                then_block,
                else_block,
            } => {
                if self.truthy(frame, *cond)? {
                    return self.exec_stmt(frame, *then_block);
                } else if let Some(else_block) = else_block {
                    return self.exec_stmt(frame, *else_block);
                }
            }
            StmtKind::Block { info, body } => {
                return match info {
                    None
                    | Some(
                        BlockInfo::Local
                        | BlockInfo::Parallel(_)
                        | BlockInfo::On { .. },
                    ) => self.exec_seq(frame, body),
                    Some(BlockInfo::CondLoop { cond }) => {
                        while self.truthy(frame, *cond)? {
                            match self.exec_seq(frame, body)? {
                                Flow::Normal => {}
                                other => return Ok(other),
                            }
                        }
                        Ok(Flow::Normal)
                    }
                    Some(BlockInfo::ForLoop(_)) => self.exec_naive_for(frame, id),
                };
            }
            StmtKind::RuntimeError(message) => {
                return Err(EvalError::Runtime(program.name_str(*message).to_owned()));
            }
            StmtKind::Noop => {}
        }
        Ok(Flow::Normal)
    }

    fn exec_yield(&mut self, frame: usize, op: Operand) -> EvalResult<Flow> {
        let value = self.operand(frame, op)?;
        let target = self.frames[frame]
            .yield_to
            .ok_or(EvalError::YieldOutsideIterator)?;
        self.set_local(target.frame, target.index, value);
        let program = self.program;
        let body = program.block_body(target.body);
        match self.exec_seq(target.frame, body)? {
            Flow::Normal => Ok(Flow::Normal),
            Flow::Return(_) | Flow::Goto(_) => Err(unsupported(
                "control flow leaving a loop body during naive iteration",
            )),
        }
    }

    fn exec_naive_for(&mut self, frame: usize, block: StmtId) -> EvalResult<Flow> {
        let program = self.program;
        let (index, iterator) = program
            .kind(block)
            .block_info()
            .and_then(BlockInfo::for_loop_header)
            .ok_or_else(|| unsupported("malformed for-loop header"))?;
        let obj = self.obj_of(frame, iterator)?;
        let ty = program.ty(self.heap.get(obj).ty);
        if ty.is_tuple() {
            return Err(unsupported("zippered for-loop must be lowered before evaluation"));
        }
        let iter_fn = ty
            .iterator_fn
            .ok_or_else(|| unsupported("for-loop over a non-iterator value"))?;
        if self.frames.len() >= self.config.max_depth {
            return Err(EvalError::DepthLimit(self.config.max_depth));
        }
        let header = ty.header_fields as usize;
        let def = program.func(iter_fn);
        let mut iter_frame = Frame::new(iter_fn);
        {
            let fields = &self.heap.get(obj).fields;
            for (i, &formal) in def.formals.iter().enumerate() {
                let value = fields.get(header + i).copied().unwrap_or(Value::Nil);
                iter_frame.locals.insert(formal, value);
            }
        }
        iter_frame.yield_to = Some(YieldTarget {
            frame,
            index,
            body: block,
        });
        *self.calls.entry(iter_fn).or_default() += 1;
        self.frames.push(iter_frame);
        let depth = self.frames.len() - 1;
        let result = self.exec_stmt(depth, def.body);
        self.frames.pop();
        match result? {
            Flow::Normal | Flow::Return(_) => Ok(Flow::Normal),
            Flow::Goto(label) => Err(EvalError::MissingLabel(
                program.sym_name(label).to_owned(),
            )),
        }
    }

    // Expressions

    fn eval_expr(&mut self, frame: usize, expr: &Expr) -> EvalResult<Value> {
        let program = self.program;
        match expr {
            Expr::Use(op) => self.operand(frame, *op),
            Expr::Prim { op, args } => {
                let values = args
                    .iter()
                    .map(|a| self.operand(frame, *a))
                    .collect::<EvalResult<Vec<_>>>()?;
                eval_prim(*op, &values)
            }
            Expr::Call { callee, args } => {
                let values = args
                    .iter()
                    .map(|a| self.operand(frame, *a))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(*callee, values)
            }
            Expr::FtableCall { slot, args } => {
                let slot_value = self.operand(frame, *slot)?;
                let slot = slot_value
                    .as_int()
                    .ok_or_else(|| type_error("function table slot", &slot_value))?;
                let callee = u32::try_from(slot)
                    .ok()
                    .and_then(|s| program.ftable.get(s))
                    .ok_or(EvalError::EmptySlot(slot))?;
                let values = args
                    .iter()
                    .map(|a| self.operand(frame, *a))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(callee, values)
            }
            Expr::GetMember { base, field } => {
                let obj = self.obj_of(frame, *base)?;
                let index = self.field_index(obj, *field)?;
                Ok(Value::Ref(Place::Field { obj, index }))
            }
            Expr::GetMemberValue { base, field } => {
                let obj = self.obj_of(frame, *base)?;
                let index = self.field_index(obj, *field)?;
                Ok(self.heap.get(obj).fields[index as usize])
            }
            Expr::Cast { ty, value } => {
                let value = self.operand(frame, *value)?;
                Ok(match program.ty(*ty).kind {
                    TypeKind::Int => value.as_int().map_or(value, Value::Int),
                    TypeKind::Bool => value.as_bool().map_or(value, Value::Bool),
                    _ => value,
                })
            }
            Expr::GetCid { value, class } => {
                let value = self.read(frame, *value)?;
                let obj = match value {
                    Value::Obj(obj) => Some(obj),
                    Value::Ref(place) => match self.load(place)? {
                        Value::Obj(obj) => Some(obj),
                        _ => None,
                    },
                    _ => None,
                };
                Ok(Value::Bool(
                    obj.is_some_and(|o| self.heap.get(o).ty == *class),
                ))
            }
            Expr::AddrOf(sym) => Ok(Value::Ref(Place::Local { frame, sym: *sym })),
            Expr::Deref(sym) => match self.read(frame, *sym)? {
                Value::Ref(place) => self.load(place),
                other => Err(type_error("reference", &other)),
            },
        }
    }

    fn operand(&self, frame: usize, op: Operand) -> EvalResult<Value> {
        match op {
            Operand::Sym(sym) => self.read(frame, sym),
            Operand::Const(Lit::Int(v)) => Ok(Value::Int(v)),
            Operand::Const(Lit::Bool(b)) => Ok(Value::Bool(b)),
            Operand::Const(Lit::Str(s)) => Ok(Value::Str(s)),
            Operand::Const(Lit::Void) => Ok(Value::Void),
        }
    }

    fn truthy(&self, frame: usize, op: Operand) -> EvalResult<bool> {
        let value = self.operand(frame, op)?;
        value.as_bool().ok_or_else(|| type_error("bool", &value))
    }

    // Storage

    fn read(&self, frame: usize, sym: SymId) -> EvalResult<Value> {
        self.frames[frame]
            .locals
            .get(&sym)
            .copied()
            .ok_or_else(|| EvalError::UndefinedVariable(self.describe_sym(frame, sym)))
    }

    fn describe_sym(&self, frame: usize, sym: SymId) -> String {
        let func = self.frames[frame].func;
        format!(
            "{}` in `{}",
            self.program.sym_name(sym),
            self.program.fn_name(func)
        )
    }

    fn set_local(&mut self, frame: usize, sym: SymId, value: Value) {
        self.frames[frame].locals.insert(sym, value);
    }

    fn load(&self, place: Place) -> EvalResult<Value> {
        match place {
            Place::Local { frame, sym } => self.read(frame, sym),
            Place::Field { obj, index } => Ok(self.heap.get(obj).fields[index as usize]),
        }
    }

    fn store(&mut self, place: Place, value: Value) -> EvalResult<()> {
        match place {
            Place::Local { frame, sym } => {
                if frame >= self.frames.len() {
                    return Err(unsupported("store through a dangling reference"));
                }
                self.set_local(frame, sym, value);
            }
            Place::Field { obj, index } => {
                self.heap.get_mut(obj).fields[index as usize] = value;
            }
        }
        Ok(())
    }

    /// Object held by `sym`, looking through one reference.
    fn obj_of(&self, frame: usize, sym: SymId) -> EvalResult<ObjId> {
        match self.read(frame, sym)? {
            Value::Obj(obj) => Ok(obj),
            Value::Ref(place) => match self.load(place)? {
                Value::Obj(obj) => Ok(obj),
                other => Err(type_error("object", &other)),
            },
            other => Err(type_error("object", &other)),
        }
    }

    fn field_index(&self, obj: ObjId, field: FieldRef) -> EvalResult<u32> {
        let object = self.heap.get(obj);
        let ty = self.program.ty(object.ty);
        let index = match field {
            FieldRef::Index(i) => Some(i).filter(|&i| (i as usize) < object.fields.len()),
            FieldRef::Ordinal(n) => ty.ordinal_field(n),
        };
        index.ok_or_else(|| EvalError::NoSuchField {
            ty: self.program.name_str(ty.name).to_owned(),
            field: format!("{field:?}"),
        })
    }

    fn default_value(&mut self, ty: TypeId) -> Value {
        let program = self.program;
        let def = program.ty(ty);
        match def.kind {
            TypeKind::Void => Value::Void,
            TypeKind::Bool => Value::Bool(false),
            TypeKind::Int => Value::Int(0),
            TypeKind::Str => Value::Str(Name::EMPTY),
            TypeKind::Ref(_) | TypeKind::FnRef => Value::Nil,
            TypeKind::Record | TypeKind::Class => {
                let fields = def
                    .fields
                    .iter()
                    .map(|f| scalar_default(program, f.ty))
                    .collect();
                Value::Obj(self.heap.alloc(ty, fields))
            }
        }
    }
}

/// Field default: scalars get their zero value, aggregates start unset.
fn scalar_default(program: &Program, ty: TypeId) -> Value {
    match program.ty(ty).kind {
        TypeKind::Void => Value::Void,
        TypeKind::Bool => Value::Bool(false),
        TypeKind::Int => Value::Int(0),
        TypeKind::Str => Value::Str(Name::EMPTY),
        TypeKind::Record | TypeKind::Class | TypeKind::Ref(_) | TypeKind::FnRef => Value::Nil,
    }
}

fn eval_prim(op: PrimOp, values: &[Value]) -> EvalResult<Value> {
    let int = |v: &Value| v.as_int().ok_or_else(|| type_error("int", v));
    let boolean = |v: &Value| v.as_bool().ok_or_else(|| type_error("bool", v));
    match (op, values) {
        (PrimOp::Not, [a]) => Ok(Value::Bool(!boolean(a)?)),
        (PrimOp::Add, [a, b]) => Ok(Value::Int(int(a)?.wrapping_add(int(b)?))),
        (PrimOp::Sub, [a, b]) => Ok(Value::Int(int(a)?.wrapping_sub(int(b)?))),
        (PrimOp::Mul, [a, b]) => Ok(Value::Int(int(a)?.wrapping_mul(int(b)?))),
        (PrimOp::Lt, [a, b]) => Ok(Value::Bool(int(a)? < int(b)?)),
        (PrimOp::Le, [a, b]) => Ok(Value::Bool(int(a)? <= int(b)?)),
        (PrimOp::Gt, [a, b]) => Ok(Value::Bool(int(a)? > int(b)?)),
        (PrimOp::Ge, [a, b]) => Ok(Value::Bool(int(a)? >= int(b)?)),
        (PrimOp::Eq, [a, b]) => Ok(Value::Bool(values_equal(*a, *b))),
        (PrimOp::Ne, [a, b]) => Ok(Value::Bool(!values_equal(*a, *b))),
        (PrimOp::And, [a, b]) => Ok(Value::Bool(boolean(a)? && boolean(b)?)),
        (PrimOp::Or, [a, b]) => Ok(Value::Bool(boolean(a)? || boolean(b)?)),
        _ => Err(EvalError::TypeError(format!(
            "{op:?} applied to {} operand(s)",
            values.len()
        ))),
    }
}

fn values_equal(a: Value, b: Value) -> bool {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
