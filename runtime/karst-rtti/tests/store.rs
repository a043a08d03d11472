//! Declaration, definition, and layout behavior of the type store.

use std::hash::{Hash, Hasher};

use karst_rtti::{hashing::FnvHasher, Field, PrimitiveTy, TypeError, TypeHeader, TypeStore};
use karst_target::Size;

fn size(bytes: u64) -> Size {
    Size::from_bytes(bytes)
}

#[test]
fn primitives_are_predeclared_and_defined() {
    let store = TypeStore::new();
    let i64 = store.common_tys.i64;

    assert!(store.defined(i64));
    assert_eq!(store.size(i64).unwrap(), size(8));
    assert_eq!(store.alignment(i64).unwrap().bytes(), 8);
    assert!(store.is_trivial(i64).unwrap());
    assert_eq!(store.description(i64), "Int64");

    assert_eq!(store.size(store.common_tys.boolean).unwrap(), size(1));
    assert_eq!(store.size(store.common_tys.i32).unwrap(), size(4));
    assert_eq!(store.size(store.common_tys.str).unwrap(), store.data_layout().pointer_size);
}

#[test]
fn declaring_a_primitive_again_returns_the_common_handle() {
    let mut store = TypeStore::new();

    assert_eq!(store.declare_primitive(PrimitiveTy::I32), store.common_tys.i32);
    assert_eq!(store.primitive(PrimitiveTy::Str), store.common_tys.str);
}

#[test]
fn interning_is_idempotent() {
    let mut store = TypeStore::new();
    let i64 = store.common_tys.i64;

    let first = store.declare(TypeHeader::product("Pair", [i64, i64]));
    let second = store.declare(TypeHeader::product("Pair", [i64, i64]));
    assert_eq!(first, second);

    // The same shape under the other composite variant is a distinct type.
    let sum = store.declare(TypeHeader::sum("Pair", [i64, i64]));
    assert_ne!(first, sum);

    // So is the same name with arguments in a different order.
    let i32 = store.common_tys.i32;
    let flipped = store.declare(TypeHeader::product("Pair", [i64, i32]));
    assert_ne!(first, flipped);
}

#[test]
fn equal_headers_hash_alike() {
    let store = TypeStore::new();
    let i64 = store.common_tys.i64;

    let a = TypeHeader::product("Pair", [i64, i64]);
    let b = TypeHeader::product("Pair", [i64, i64]);
    assert_eq!(a, b);

    let hash_of = |header: &TypeHeader| {
        let mut hasher = FnvHasher::default();
        header.hash(&mut hasher);
        hasher.finish()
    };
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn pair_layout_matches_declared_order() {
    let mut store = TypeStore::new();
    let (i64, i32) = (store.common_tys.i64, store.common_tys.i32);

    let pair = store.declare(TypeHeader::product("Pair", [i64, i32]));
    store.define_struct(pair, vec![Field::inline(i64), Field::inline(i32)]).unwrap();

    assert_eq!(store.offset(pair, 0).unwrap(), size(0));
    assert_eq!(store.offset(pair, 1).unwrap(), size(8));
    assert_eq!(store.size(pair).unwrap(), size(12));
    assert_eq!(store.alignment(pair).unwrap().bytes(), 8);
    assert_eq!(store.stride(pair).unwrap(), size(16));
    assert!(store.is_trivial(pair).unwrap());
    assert_eq!(store.description(pair), "Pair<Int64, Int32>");
}

#[test]
fn empty_struct_is_zero_sized_and_trivial() {
    let mut store = TypeStore::new();

    let unit = store.declare(TypeHeader::product("Unit", []));
    store.define_struct(unit, vec![]).unwrap();

    assert_eq!(store.size(unit).unwrap(), Size::ZERO);
    assert_eq!(store.alignment(unit).unwrap().bytes(), 1);
    assert!(store.is_trivial(unit).unwrap());
    assert_eq!(store.stride(unit).unwrap(), size(1));
    assert_eq!(store.description(unit), "Unit");
}

#[test]
fn offsets_respect_field_alignment() {
    let mut store = TypeStore::new();
    let (boolean, i64) = (store.common_tys.boolean, store.common_tys.i64);

    let mixed = store.declare(TypeHeader::product("Mixed", [boolean, i64]));
    store.define_struct(mixed, vec![Field::inline(boolean), Field::inline(i64)]).unwrap();

    let metatype = store.metatype(mixed).unwrap();
    assert_eq!(metatype.offsets(), &[size(0), size(8)]);
    assert_eq!(metatype.size(), size(16));

    // Each offset is a multiple of its field's alignment, and the
    // stride is a multiple of the overall alignment.
    for (index, &offset) in metatype.offsets().iter().enumerate() {
        let field = metatype.fields()[index];
        assert!(offset.is_aligned_to(store.field_alignment(field).unwrap()));
    }
    assert!(store.stride(mixed).unwrap().is_aligned_to(store.alignment(mixed).unwrap()));
}

#[test]
fn enum_layouts_by_case_count() {
    let mut store = TypeStore::new();
    let i32 = store.common_tys.i32;

    // A sum with no cases takes no space.
    let never = store.declare(TypeHeader::sum("Never", []));
    store.define_enum(never, vec![]).unwrap();
    assert_eq!(store.size(never).unwrap(), Size::ZERO);
    assert_eq!(store.alignment(never).unwrap().bytes(), 1);
    assert!(store.is_trivial(never).unwrap());

    // A sum with a single case adopts that case's layout and has no tag.
    let only = store.declare(TypeHeader::sum("Only", [i32]));
    store.define_enum(only, vec![Field::inline(i32)]).unwrap();
    let metatype = store.metatype(only).unwrap();
    assert_eq!(metatype.size(), size(4));
    assert_eq!(metatype.alignment().bytes(), 4);
    assert_eq!(metatype.offsets(), &[Size::ZERO]);
}

#[test]
fn two_case_sums_carry_a_trailing_tag() {
    let mut store = TypeStore::new();
    let i32 = store.common_tys.i32;

    let nothing = store.declare(TypeHeader::product("Nothing", [i32]));
    store.define_struct(nothing, vec![]).unwrap();
    let just = store.declare(TypeHeader::product("Just", [i32]));
    store.define_struct(just, vec![Field::inline(i32)]).unwrap();

    let maybe = store.declare(TypeHeader::sum("Maybe", [i32]));
    store.define_enum(maybe, vec![Field::inline(nothing), Field::inline(just)]).unwrap();

    // The payload occupies the first four bytes, the 16-bit tag sits
    // right after the largest case.
    let metatype = store.metatype(maybe).unwrap();
    assert_eq!(metatype.offsets(), &[size(0), size(4)]);
    assert_eq!(metatype.size(), size(6));
    assert_eq!(metatype.alignment().bytes(), 4);
    assert_eq!(store.stride(maybe).unwrap(), size(8));
    assert_eq!(store.description(maybe), "Maybe<Int32>");
}

#[test]
fn recursive_list_layout() {
    let mut store = TypeStore::new();
    let i64 = store.common_tys.i64;
    let dl = store.data_layout().clone();

    let list = store.declare(TypeHeader::sum("List", [i64]));
    let cons = store.declare(TypeHeader::product("List.Cons", [i64]));
    let empty = store.declare(TypeHeader::product("List.Empty", [i64]));

    // `List` is only declared at this point; the tail breaks the size
    // cycle by being stored out-of-line.
    store.define_struct(cons, vec![Field::inline(i64), Field::indirect(list)]).unwrap();
    store.define_struct(empty, vec![]).unwrap();
    store.define_enum(list, vec![Field::inline(cons), Field::inline(empty)]).unwrap();

    assert_eq!(store.size(cons).unwrap(), size(8) + dl.pointer_size);
    assert_eq!(
        store.alignment(cons).unwrap().bytes(),
        dl.pointer_align.bytes().max(8)
    );
    assert!(!store.is_trivial(cons).unwrap());
    assert!(!store.is_trivial(list).unwrap());

    // The list payload is the larger case (the cons cell), with the
    // tag after it.
    let metatype = store.metatype(list).unwrap();
    assert_eq!(metatype.offsets()[0], Size::ZERO);
    assert_eq!(metatype.offsets()[1], (size(8) + dl.pointer_size).align_to(dl.tag_align()));
    assert_eq!(metatype.size(), metatype.offsets()[1] + dl.tag_size());

    assert_eq!(store.description(cons), "List.Cons<Int64>");
    assert_eq!(store.description(list), "List<Int64>");
}

#[test]
fn redefinition_fails() {
    let mut store = TypeStore::new();
    let i64 = store.common_tys.i64;

    let pair = store.declare(TypeHeader::product("Pair", [i64, i64]));
    store.define_struct(pair, vec![Field::inline(i64), Field::inline(i64)]).unwrap();

    let error = store.define_struct(pair, vec![Field::inline(i64)]).unwrap_err();
    assert!(matches!(error, TypeError::Redefinition { .. }), "got {error}");
    assert!(error.to_string().contains("Pair<Int64, Int64>"));

    // The first definition is untouched.
    assert_eq!(store.size(pair).unwrap(), size(16));
}

#[test]
fn layout_queries_on_undefined_types_fail() {
    let mut store = TypeStore::new();
    let i64 = store.common_tys.i64;

    let pending = store.declare(TypeHeader::product("Pending", [i64]));
    assert!(!store.defined(pending));

    let error = store.size(pending).unwrap_err();
    assert!(matches!(error, TypeError::UndefinedType { .. }), "got {error}");
    assert!(error.to_string().contains("Pending<Int64>"));
}

#[test]
fn define_requires_defined_inline_children() {
    let mut store = TypeStore::new();
    let i64 = store.common_tys.i64;

    let child = store.declare(TypeHeader::product("Child", []));
    let parent = store.declare(TypeHeader::product("Parent", [i64]));

    // An inline field of an undefined type has no size yet.
    let error = store
        .define_struct(parent, vec![Field::inline(i64), Field::inline(child)])
        .unwrap_err();
    assert!(matches!(error, TypeError::UndefinedType { .. }), "got {error}");

    // The failed definition left no partial layout behind.
    assert!(!store.defined(parent));
    store.define_struct(child, vec![]).unwrap();
    store.define_struct(parent, vec![Field::inline(i64), Field::inline(child)]).unwrap();
    assert_eq!(store.size(parent).unwrap(), size(8));
}

#[test]
fn unknown_handles_are_rejected() {
    let mut other = TypeStore::new();
    let i64 = other.common_tys.i64;
    let foreign = other.declare(TypeHeader::product("Foreign", [i64]));

    let store = TypeStore::new();
    let error = store.size(foreign).unwrap_err();
    assert!(matches!(error, TypeError::UnknownType { .. }), "got {error}");
}

#[test]
fn descriptions_nest_through_type_arguments() {
    use karst_rtti::WriteTy;

    let mut store = TypeStore::new();
    let (i64, i32) = (store.common_tys.i64, store.common_tys.i32);

    let pair = store.declare(TypeHeader::product("Pair", [i64, i32]));
    let wrap = store.declare(TypeHeader::product("Wrap", [pair]));

    assert_eq!(store.description(wrap), "Wrap<Pair<Int64, Int32>>");
    assert_eq!(format!("{}", wrap.for_formatting(&store)), "Wrap<Pair<Int64, Int32>>");
}

#[test]
fn sum_slots_do_not_grow_with_case_count() {
    let mut store = TypeStore::new();
    let (boolean, i32, i64) = (store.common_tys.boolean, store.common_tys.i32, store.common_tys.i64);

    let choice = store.declare(TypeHeader::sum("Choice", []));
    store
        .define_enum(
            choice,
            vec![Field::inline(boolean), Field::inline(i32), Field::inline(i64)],
        )
        .unwrap();

    // Three cases, but still exactly two addressable slots: the payload
    // and the tag. The per-case types live in `fields`.
    let metatype = store.metatype(choice).unwrap();
    assert_eq!(metatype.fields().len(), 3);
    assert_eq!(metatype.offsets().len(), 2);
    assert_eq!(metatype.offsets(), &[size(0), size(8)]);
    assert_eq!(metatype.size(), size(10));

    let error = store.offset(choice, 2).unwrap_err();
    assert!(matches!(error, TypeError::IndexOutOfRange { .. }), "got {error}");
}

#[test]
fn field_queries_use_pointer_layout_for_indirection() {
    let mut store = TypeStore::new();
    let dl = store.data_layout().clone();

    // The pointee is declared but never defined; an indirect field can
    // still answer size, alignment, and triviality.
    let pending = store.declare(TypeHeader::product("Pending", []));
    let field = Field::indirect(pending);

    assert_eq!(store.field_size(field).unwrap(), dl.pointer_size);
    assert_eq!(store.field_alignment(field).unwrap(), dl.pointer_align);
    assert!(!store.field_is_trivial(field).unwrap());
}
