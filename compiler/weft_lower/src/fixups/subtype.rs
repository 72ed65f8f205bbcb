//! Runtime-subtype dispatch in `get_iterator`.
//!
//! An iterator whose instance record has runtime subtypes gets, at the head
//! of its `get_iterator`, one test per subtype on the class of the record's
//! first field. On a match the record is rebuilt as the subtype's record,
//! field by field and by name, and handed to the subtype's `get_iterator`.

use weft_ir::{Expr, FieldRef, FnId, IrBuilder, Operand, Program, Span, TypeId};

use crate::error::internal;
use crate::LowerResult;

/// Add subtype cascades to every affected `get_iterator`. Returns the
/// number of subtype tests emitted.
pub fn reconstruct_subtype_records(program: &mut Program) -> LowerResult<usize> {
    let targets: Vec<(FnId, TypeId)> = program
        .fn_ids()
        .filter_map(|f| {
            let info = program.func(f).iterator_info.as_ref()?;
            let has_children = program
                .ty(info.irecord)
                .dispatch_children
                .iter()
                .any(|&c| c != TypeId::OBJECT);
            has_children.then_some((info.get_iterator, info.irecord))
        })
        .collect();
    let mut count = 0;
    for (get_iterator, irecord) in targets {
        count += add_cascade(program, get_iterator, irecord)?;
    }
    Ok(count)
}

fn add_cascade(program: &mut Program, get_iterator: FnId, irecord: TypeId) -> LowerResult<usize> {
    let span = program.func(get_iterator).span;
    let record = program
        .func(get_iterator)
        .formal(0)
        .ok_or_else(|| internal("get_iterator without a record formal", span))?;
    let ret_ty = program.func(get_iterator).ret_type;
    let discriminator_ty = program
        .ty(irecord)
        .field(0)
        .map(|f| f.ty)
        .ok_or_else(|| internal("iterator record with subtypes has no fields", span))?;
    let children: Vec<TypeId> = program
        .ty(irecord)
        .dispatch_children
        .iter()
        .copied()
        .filter(|&c| c != TypeId::OBJECT)
        .collect();

    let cascade = program.new_scratch_block();
    let mut count = 0;
    for child in children {
        let child_gi = program
            .iterator_fn_of(child)
            .and_then(|f| program.func(f).iterator_info.as_ref())
            .map(|info| info.get_iterator)
            .ok_or_else(|| internal("record subtype has no get_iterator", span))?;
        let child_class = program
            .ty(child)
            .field(0)
            .map(|f| f.ty)
            .ok_or_else(|| internal("record subtype has no discriminator field", span))?;
        let copies = field_copies(program, irecord, child, span)?;
        let class_ty = program.func(child_gi).ret_type;

        let mut b = IrBuilder::at_block(program, get_iterator, cascade).with_span(span);
        let tag = b.fresh_var("_tag", discriminator_ty);
        b.emit_assign(
            tag,
            Expr::GetMemberValue {
                base: record,
                field: FieldRef::Index(0),
            },
        );
        let cid = b.fresh_var("_cid", TypeId::BOOL);
        b.emit_assign(
            cid,
            Expr::GetCid {
                value: tag,
                class: child_class,
            },
        );
        let (then_block, _) = b.emit_cond(cid.into(), false);
        b.position_at(then_block);
        let child_record = b.fresh_var("_record", child);
        for FieldCopy { from, to, from_ty, to_ty } in copies {
            let value = b.fresh_var("_field", from_ty);
            b.emit_assign(
                value,
                Expr::GetMemberValue {
                    base: record,
                    field: FieldRef::Index(from),
                },
            );
            let value = if from_ty == to_ty {
                value
            } else {
                let cast = b.fresh_var("_field", to_ty);
                b.emit_assign(
                    cast,
                    Expr::Cast {
                        ty: to_ty,
                        value: value.into(),
                    },
                );
                cast
            };
            b.emit_set_member(child_record, FieldRef::Index(to), value.into());
        }
        let class = b.fresh_var("_class", class_ty);
        b.emit_assign(class, Expr::call(child_gi, [Operand::Sym(child_record)]));
        let ret = b.fresh_var("_ret", ret_ty);
        b.emit_assign(
            ret,
            Expr::Cast {
                ty: ret_ty,
                value: class.into(),
            },
        );
        b.emit_return(ret.into());
        count += 1;
    }
    let body = program.func(get_iterator).body;
    program.splice_at_head(body, cascade)?;
    tracing::debug!(
        get_iterator = program.fn_name(get_iterator),
        subtypes = count,
        "added subtype record dispatch"
    );
    Ok(count)
}

struct FieldCopy {
    from: u32,
    to: u32,
    from_ty: TypeId,
    to_ty: TypeId,
}

/// Where each field of `child` comes from in `base`, matched by name.
fn field_copies(
    program: &Program,
    base: TypeId,
    child: TypeId,
    span: Span,
) -> LowerResult<Vec<FieldCopy>> {
    let base_def = program.ty(base);
    (0u32..)
        .zip(&program.ty(child).fields)
        .map(|(to, field)| {
            let from = base_def.field_named(field.name).ok_or_else(|| {
                internal(
                    format!(
                        "record `{}` has no field `{}`",
                        program.name_str(base_def.name),
                        program.name_str(field.name)
                    ),
                    span,
                )
            })?;
            let from_ty = base_def.fields[from as usize].ty;
            Ok(FieldCopy {
                from,
                to,
                from_ty,
                to_ty: field.ty,
            })
        })
        .collect()
}
