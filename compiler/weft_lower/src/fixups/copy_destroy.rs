//! Field-wise copy and destroy routines for iterator records.
//!
//! Earlier passes leave placeholder bodies on the copy/destroy routines of
//! iterator records, since the record layout is only final once lowering is
//! done. Each body is rebuilt over the final fields, delegating to the
//! routine registered for a field's type when there is one.

use weft_ir::{
    Expr, FieldRef, FnFlags, FnId, Operand, Program, Span, StmtId, StmtKind, SymId, TypeFlags,
    TypeId,
};

use crate::LowerResult;

/// Rebuild every copy/destroy routine over an iterator record. Returns the
/// number of rebuilt bodies.
pub fn synthesize_copy_destroy(program: &mut Program) -> LowerResult<usize> {
    let mut count = 0;
    let funcs: Vec<FnId> = program.fn_ids().collect();
    for func in funcs {
        let def = program.func(func);
        let [arg] = def.formals.as_slice() else {
            continue;
        };
        let arg = *arg;
        let record = program.value_type(program.sym_ty(arg));
        if !program.ty(record).flags.contains(TypeFlags::ITERATOR_RECORD) {
            continue;
        }
        let flags = def.flags;
        if flags.contains(FnFlags::AUTO_COPY) {
            rebuild_copy(program, func, arg, record)?;
            count += 1;
        } else if flags.contains(FnFlags::AUTO_DESTROY) {
            rebuild_destroy(program, func, arg, record)?;
            count += 1;
        }
    }
    Ok(count)
}

fn field_types(program: &Program, record: TypeId) -> Vec<TypeId> {
    program.ty(record).fields.iter().map(|f| f.ty).collect()
}

fn read_field(
    program: &mut Program,
    func: FnId,
    block: StmtId,
    arg: SymId,
    index: u32,
    ty: TypeId,
    span: Span,
) -> LowerResult<SymId> {
    let tmp = program.new_local(func, "_field", ty);
    program.push(block, StmtKind::Def(tmp), span)?;
    program.push(
        block,
        StmtKind::Assign {
            dst: tmp,
            value: Expr::GetMemberValue {
                base: arg,
                field: FieldRef::Index(index),
            },
        },
        span,
    )?;
    Ok(tmp)
}

fn rebuild_copy(program: &mut Program, func: FnId, arg: SymId, record: TypeId) -> LowerResult<()> {
    let span = program.func(func).span;
    let ret_ty = program.func(func).ret_type;
    let ret = match program.func(func).ret_sym {
        Some(ret) => ret,
        None => program.new_local(func, "_ret", ret_ty),
    };
    let block = program.new_scratch_block();
    program.push(block, StmtKind::Def(ret), span)?;
    for (index, ty) in (0u32..).zip(field_types(program, record)) {
        let value = read_field(program, func, block, arg, index, ty, span)?;
        let value = match program.auto_copy.get(&ty).copied() {
            Some(copy) => {
                let copied = program.new_local(func, "_copy", program.func(copy).ret_type);
                program.push(block, StmtKind::Def(copied), span)?;
                program.push(
                    block,
                    StmtKind::Assign {
                        dst: copied,
                        value: Expr::call(copy, [Operand::Sym(value)]),
                    },
                    span,
                )?;
                copied
            }
            None => value,
        };
        program.push(
            block,
            StmtKind::SetMember {
                base: ret,
                field: FieldRef::Index(index),
                value: value.into(),
            },
            span,
        )?;
    }
    program.push(block, StmtKind::Return(ret.into()), span)?;
    let old = program.func(func).body;
    program.replace(old, block)?;
    tracing::debug!(func = program.fn_name(func), "rebuilt iterator record copy");
    Ok(())
}

fn rebuild_destroy(program: &mut Program, func: FnId, arg: SymId, record: TypeId) -> LowerResult<()> {
    let span = program.func(func).span;
    let block = program.new_scratch_block();
    for (index, ty) in (0u32..).zip(field_types(program, record)) {
        let Some(destroy) = program.auto_destroy.get(&ty).copied() else {
            continue;
        };
        let value = read_field(program, func, block, arg, index, ty, span)?;
        program.push(
            block,
            StmtKind::Eval(Expr::call(destroy, [Operand::Sym(value)])),
            span,
        )?;
    }
    program.push(block, StmtKind::Return(Operand::VOID), span)?;
    let old = program.func(func).body;
    program.replace(old, block)?;
    tracing::debug!(func = program.fn_name(func), "rebuilt iterator record destroy");
    Ok(())
}
