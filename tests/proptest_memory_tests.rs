//! Property-based tests for the VM memories and type compatibility
//!
//! These tests use proptest to verify that:
//! 1. Static RAM reads back what was written, anywhere below its limit
//! 2. The heap allocator accounts for every cell it hands out
//! 3. Type compatibility is reflexive and symmetric, including recursive types

use std::collections::HashSet;

use proptest::prelude::*;
use tiny::compiler::Resolver;
use tiny::parser::{parse_source, Ast, TypeId};
use tiny::runtime::{BlockAllocator, Ram};
use tiny::types::compatible;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Generate type expressions over the basic types and the recursive `L`
fn type_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("int".to_string()),
        Just("real".to_string()),
        Just("bool".to_string()),
        Just("string".to_string()),
        Just("L".to_string()),
        Just("pointer(L)".to_string()),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            (inner.clone(), 0usize..4).prop_map(|(t, n)| format!("array({}, {})", t, n)),
            prop::collection::vec(inner.clone(), 1..4).prop_map(|fields| {
                let fields: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, t)| format!("f{}: {}", i, t))
                    .collect();
                format!("record({})", fields.join(", "))
            }),
            inner.prop_map(|t| format!("pointer({})", t)),
        ]
    })
}

/// Declares `L` plus two aliases and resolves the program
fn resolved_types(t1: &str, t2: &str) -> (Ast, TypeId, TypeId) {
    let source = format!(
        "type L = record(v: int, next: pointer(L)); type A = {}; type B = {};",
        t1, t2
    );
    let mut ast = parse_source(&source).unwrap();
    Resolver::new(&mut ast).resolve().unwrap();
    let declared = |name: &str| {
        ast.decl_ids()
            .find(|d| ast[*d].kind.name() == name)
            .and_then(|d| ast[d].kind.declared_type())
            .unwrap()
    };
    let (a, b) = (declared("A"), declared("B"));
    (ast, a, b)
}

// =============================================================================
// STATIC RAM
// =============================================================================

proptest! {
    #[test]
    fn ram_write_then_read(
        first in 0usize..20,
        writes in prop::collection::vec((0usize..500, any::<i64>()), 1..50),
    ) {
        let mut ram = Ram::new(first, 500);
        for (addr, value) in &writes {
            ram.write(*addr, *value).unwrap();
            prop_assert_eq!(ram.read(*addr), Some(value));
        }
        let highest = writes.iter().map(|(a, _)| *a).max().unwrap();
        prop_assert_eq!(ram.len(), highest + 1);
    }

    #[test]
    fn ram_reserve_never_shrinks(first in 0usize..20, a in 0usize..300, b in 0usize..300) {
        let mut ram: Ram<i64> = Ram::new(first, 300);
        ram.reserve(a).unwrap();
        let end = ram.len();
        ram.reserve(b).unwrap();
        prop_assert!(ram.len() >= end);
        prop_assert_eq!(ram.len(), a.max(b));
    }

    #[test]
    fn ram_pop_then_push_round_trips(first in 1usize..20, n in 1usize..200, v in any::<i64>()) {
        let mut ram = Ram::new(first, 1000);
        for i in 0..n {
            ram.push_back(i as i64).unwrap();
        }
        prop_assert_eq!(ram.pop_back(), Some(n as i64 - 1));
        ram.push_back(v).unwrap();
        prop_assert_eq!(ram.len(), n);
        prop_assert_eq!(ram.read(n - 1), Some(&v));
        if n > 1 {
            prop_assert_eq!(ram.read(n - 2), Some(&(n as i64 - 2)));
        }
    }

    #[test]
    fn ram_block_matches_cells(start in 0usize..100, values in prop::collection::vec(any::<i64>(), 0..80)) {
        let mut ram = Ram::new(4, 200);
        let cells: Vec<Option<i64>> = values.iter().copied().map(Some).collect();
        ram.write_block(start, &cells).unwrap();
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(ram.read(start + i), Some(value));
        }
        prop_assert_eq!(ram.read_block(start, values.len()), cells);
    }
}

// =============================================================================
// HEAP
// =============================================================================

proptest! {
    #[test]
    fn heap_allocate_destroy_restores_count(
        capacity in 1usize..200,
        sizes in prop::collection::vec(1usize..10, 1..20),
    ) {
        let mut heap: BlockAllocator<i64> = BlockAllocator::new(capacity);
        let mut blocks = Vec::new();
        for n in sizes {
            let before = heap.used();
            match heap.allocate(n) {
                Ok(Some(start)) => {
                    prop_assert_eq!(heap.used(), before + n);
                    blocks.push((start, n));
                }
                Ok(None) => prop_assert!(false, "non-empty request returned nil"),
                Err(_) => prop_assert!(before + n > capacity),
            }
        }
        for (start, n) in blocks {
            heap.destroy(start, n).unwrap();
        }
        prop_assert_eq!(heap.used(), 0);
    }

    #[test]
    fn heap_single_cells_until_exhaustion(capacity in 1usize..300) {
        let mut heap: BlockAllocator<i64> = BlockAllocator::new(capacity);
        let mut starts = HashSet::new();
        while let Ok(Some(start)) = heap.allocate(1) {
            starts.insert(start);
        }
        prop_assert_eq!(starts.len(), capacity);
        prop_assert!(heap.allocate(1).is_err());
    }

    #[test]
    fn heap_block_round_trip(
        holes in prop::collection::vec(1usize..4, 0..6),
        values in prop::collection::vec(any::<i64>(), 1..12),
    ) {
        // fragment the heap so the block is scattered
        let mut heap = BlockAllocator::new(64);
        let mut keep = Vec::new();
        for n in holes {
            let hole = heap.allocate(n).unwrap().unwrap();
            keep.push(heap.allocate(1).unwrap().unwrap());
            heap.destroy(hole, n).unwrap();
        }
        let cells: Vec<Option<i64>> = values.iter().copied().map(Some).collect();
        let start = heap.allocate(cells.len()).unwrap().unwrap();
        heap.write_block(start, &cells).unwrap();
        prop_assert_eq!(heap.read_block(start, cells.len()).unwrap(), cells);
        for cell in keep {
            prop_assert!(heap.is_allocated(cell));
        }
    }
}

// =============================================================================
// TYPE COMPATIBILITY
// =============================================================================

proptest! {
    #[test]
    fn compatibility_is_reflexive(t in type_expr()) {
        let (ast, a, b) = resolved_types(&t, &t);
        prop_assert!(compatible(&ast, a, a));
        prop_assert!(compatible(&ast, a, b));
    }

    #[test]
    fn compatibility_is_symmetric(t1 in type_expr(), t2 in type_expr()) {
        let (ast, a, b) = resolved_types(&t1, &t2);
        prop_assert_eq!(compatible(&ast, a, b), compatible(&ast, b, a));
    }
}

#[test]
fn recursive_aliases_are_compatible() {
    let (ast, a, b) = resolved_types(
        "record(v: int, next: pointer(A))",
        "record(v: int, next: pointer(B))",
    );
    assert!(compatible(&ast, a, b));
}
