//! Builds the recursive `List<Int64>` type, constructs the value
//! `Cons(42, Empty)` on a temporary buffer, and prints its layout and
//! textual form.

use karst_rtti::{Field, TypeHeader, TypeId, TypeStore};

/// Declare (and, first time round, define) `List<T>`.
fn list(store: &mut TypeStore, arg: TypeId) -> TypeId {
    let ty = store.declare(TypeHeader::sum("List", [arg]));
    if !store.defined(ty) {
        let cons = list_cons(store, arg);
        let empty = list_empty(store, arg);
        store.define_enum(ty, vec![Field::inline(cons), Field::inline(empty)]).unwrap();
    }
    ty
}

fn list_cons(store: &mut TypeStore, arg: TypeId) -> TypeId {
    let ty = store.declare(TypeHeader::product("List.Cons", [arg]));
    if !store.defined(ty) {
        let tail = store.declare(TypeHeader::sum("List", [arg]));
        store.define_struct(ty, vec![Field::inline(arg), Field::indirect(tail)]).unwrap();
    }
    ty
}

fn list_empty(store: &mut TypeStore, arg: TypeId) -> TypeId {
    let ty = store.declare(TypeHeader::product("List.Empty", [arg]));
    if !store.defined(ty) {
        store.define_struct(ty, vec![]).unwrap();
    }
    ty
}

fn main() {
    let mut store = TypeStore::new();
    let i64 = store.common_tys.i64;

    let list = list(&mut store, i64);
    let cons = list_cons(&mut store, i64);
    let empty = list_empty(&mut store, i64);

    for ty in [list, cons, empty] {
        println!(
            "{}: size {}, alignment {}, stride {}",
            store.description(ty),
            store.size(ty).unwrap(),
            store.alignment(ty).unwrap(),
            store.stride(ty).unwrap(),
        );
    }

    store
        .with_temporary_allocation(cons, 1, |value| {
            // head = 42
            unsafe {
                let head = store.address_of(cons, 0, value).unwrap();
                store.copy_initialize_primitive::<i64>(i64, head, 42).unwrap();
            }

            // tail = Empty, stored through the out-of-line slot.
            store
                .with_temporary_allocation(empty, 1, |nil| unsafe {
                    let tail = store.address_of(cons, 1, value).unwrap();
                    store.copy_initialize_enum_case(list, 1, tail, nil).unwrap();
                    store.deinitialize(empty, nil).unwrap();
                })
                .unwrap();

            println!("{}", unsafe { store.describe_instance(cons, value) }.unwrap());

            unsafe { store.deinitialize(cons, value) }.unwrap();
        })
        .unwrap();
}
