#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use rivet_ir::{Decl, Program, Type};

use crate::copy::CopySet;
use crate::error::Warning;
use crate::registry::TypeRegistry;

pub const DEFAULT_MAX_ITERATIONS: usize = 64;

pub const NO_FIXPOINT: &str = "rivet::derive::no_fixpoint";
pub const VALUE_CYCLE: &str = "rivet::derive::value_cycle";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeriveOutcome {
    /// Aggregates and enums tagged `Copy` once the pass finished.
    pub copyable: BTreeSet<String>,
    /// Passes run, including the final pass that changed nothing.
    pub iterations: usize,
    pub converged: bool,
}

impl DeriveOutcome {
    pub fn is_copyable(&self, name: &str) -> bool {
        self.copyable.contains(name)
    }

    pub fn warning(&self) -> Option<Warning> {
        (!self.converged).then(|| {
            Warning::new(
                NO_FIXPOINT,
                format!(
                    "duplicable-type closure did not settle within {} passes",
                    self.iterations
                ),
            )
        })
    }
}

/// Tag every aggregate whose fields are all trivially duplicable with
/// `Clone` and `Copy`, repeating until nothing changes or `max_iterations`
/// passes have run.
///
/// Fieldless enums and declarations that already carry `Copy` seed the set.
/// Running this on its own output changes nothing.
pub fn compute_copy_closure(program: &mut Program, max_iterations: usize) -> DeriveOutcome {
    let registry = TypeRegistry::from_program(program);
    let mut set = CopySet::with_registry(&registry);

    for decl in &mut program.decls {
        match decl {
            Decl::Enum(e) if e.has_derive("Copy") || e.is_fieldless() => {
                add_tags(&mut e.derives);
                set.insert(&e.name);
            }
            Decl::Struct(s) if s.has_derive("Copy") => {
                add_tags(&mut s.derives);
                set.insert(&s.name);
            }
            _ => {}
        }
    }

    let mut iterations = 0;
    let converged = loop {
        if iterations == max_iterations {
            break !program
                .structs()
                .any(|s| !set.contains(&s.name) && s.fields.iter().all(|f| set.admits(&f.ty)));
        }
        iterations += 1;

        let mut changed = false;
        for decl in &mut program.decls {
            let Decl::Struct(s) = decl else { continue };
            if set.contains(&s.name) || !s.fields.iter().all(|f| set.admits(&f.ty)) {
                continue;
            }
            debug!("pass {iterations}: `{}` is duplicable", s.name);
            add_tags(&mut s.derives);
            set.insert(&s.name);
            changed = true;
        }
        if !changed {
            break true;
        }
    };

    if !converged {
        warn!("duplicable-type closure stopped after {iterations} passes without settling");
    }

    DeriveOutcome {
        copyable: set.names().map(str::to_string).collect(),
        iterations,
        converged,
    }
}

fn add_tags(derives: &mut Vec<String>) {
    for tag in ["Clone", "Copy"] {
        if !derives.iter().any(|d| d == tag) {
            derives.push(tag.to_string());
        }
    }
}

/// Groups of aggregates that contain each other by value (directly or
/// through tuples and optionals). Such types have no finite size; they are
/// reported, never rewritten. Each group is sorted; groups are sorted.
pub fn find_value_cycles(program: &Program) -> Vec<Vec<String>> {
    let registry = TypeRegistry::from_program(program);
    let names: Vec<&str> = program.structs().map(|s| s.name.as_str()).collect();
    let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let edges: Vec<Vec<usize>> = program
        .structs()
        .map(|s| {
            let mut out = Vec::new();
            for f in &s.fields {
                by_value_targets(&registry.normalize(&f.ty), &mut |n| {
                    if let Some(&i) = index.get(n) {
                        out.push(i);
                    }
                });
            }
            out
        })
        .collect();

    let mut cycles = Tarjan::new(&edges)
        .run()
        .into_iter()
        .filter(|scc| scc.len() > 1 || edges[scc[0]].contains(&scc[0]))
        .map(|scc| {
            let mut group: Vec<String> = scc.iter().map(|&i| names[i].to_string()).collect();
            group.sort();
            group
        })
        .collect::<Vec<_>>();
    cycles.sort();
    cycles
}

pub fn value_cycle_warnings(program: &Program) -> Vec<Warning> {
    find_value_cycles(program)
        .into_iter()
        .map(|group| {
            warn!("by-value cycle between {}", group.join(", "));
            Warning::new(
                VALUE_CYCLE,
                format!(
                    "{} contain each other by value; one field needs indirection",
                    group.join(", ")
                ),
            )
        })
        .collect()
}

fn by_value_targets<'t>(ty: &'t Type, visit: &mut impl FnMut(&'t str)) {
    match ty {
        Type::Aggregate(n) => visit(n),
        Type::Tuple(elems) => {
            for t in elems {
                by_value_targets(t, visit);
            }
        }
        Type::Optional(inner) => by_value_targets(inner, visit),
        Type::Primitive(_)
        | Type::Enum(_)
        | Type::Sequence(_)
        | Type::Reference { .. }
        | Type::Function { .. } => {}
    }
}

struct Tarjan<'g> {
    edges: &'g [Vec<usize>],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    out: Vec<Vec<usize>>,
}

impl<'g> Tarjan<'g> {
    fn new(edges: &'g [Vec<usize>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            index: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for v in 0..self.edges.len() {
            if self.index[v].is_none() {
                self.connect(v);
            }
        }
        self.out
    }

    fn connect(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for &w in &edges[v] {
            match self.index[w] {
                None => {
                    self.connect(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(iw) if self.on_stack[w] => {
                    self.low[v] = self.low[v].min(iw);
                }
                Some(_) => {}
            }
        }

        if Some(self.low[v]) == self.index[v] {
            let mut scc = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            self.out.push(scc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_ir::build::*;
    use rivet_ir::StructDecl;

    fn structs(decls: Vec<StructDecl>) -> Program {
        Program::new(decls.into_iter().map(Decl::Struct).collect())
    }

    #[test]
    fn numeric_struct_becomes_copyable() {
        let mut program = structs(vec![struct_decl(
            "Point",
            vec![("x", Type::f64()), ("y", Type::f64())],
        )]);
        let outcome = compute_copy_closure(&mut program, DEFAULT_MAX_ITERATIONS);
        assert!(outcome.converged);
        assert!(outcome.is_copyable("Point"));
        let point = program.find_struct("Point").expect("Point");
        assert_eq!(point.derives, vec!["Clone".to_string(), "Copy".to_string()]);
    }

    #[test]
    fn owned_text_field_blocks_copy() {
        let mut program = structs(vec![struct_decl("Name", vec![("value", Type::owned_text())])]);
        let outcome = compute_copy_closure(&mut program, DEFAULT_MAX_ITERATIONS);
        assert!(outcome.converged);
        assert!(!outcome.is_copyable("Name"));
        assert!(program.find_struct("Name").expect("Name").derives.is_empty());
    }

    #[test]
    fn fieldless_enums_seed_the_set() {
        let mut program = Program::new(vec![
            Decl::Struct(struct_decl("Pixel", vec![("color", Type::aggregate("Color"))])),
            Decl::Enum(enum_decl("Color", vec![unit_variant("Red"), unit_variant("Blue")])),
            Decl::Enum(enum_decl("Shape", vec![tuple_variant("Circle", vec![Type::f64()])])),
        ]);
        // Zero passes: only the seed is present.
        let seeded = compute_copy_closure(&mut program.clone(), 0);
        assert!(seeded.is_copyable("Color"));
        assert!(!seeded.is_copyable("Pixel"));
        assert!(!seeded.converged);
        assert!(seeded.warning().is_some());

        let outcome = compute_copy_closure(&mut program, DEFAULT_MAX_ITERATIONS);
        assert!(outcome.is_copyable("Pixel"));
        assert!(!outcome.is_copyable("Shape"));
    }

    #[test]
    fn dependencies_resolve_across_passes() {
        // `Outer` comes first, so it can only be tagged on the pass after `Inner`.
        let mut program = structs(vec![
            struct_decl("Outer", vec![("inner", Type::aggregate("Inner"))]),
            struct_decl("Inner", vec![("v", Type::f64())]),
        ]);
        let outcome = compute_copy_closure(&mut program, DEFAULT_MAX_ITERATIONS);
        assert!(outcome.is_copyable("Outer"));
        assert_eq!(outcome.iterations, 3);

        let capped = compute_copy_closure(
            &mut structs(vec![
                struct_decl("Outer", vec![("inner", Type::aggregate("Inner"))]),
                struct_decl("Inner", vec![("v", Type::f64())]),
            ]),
            1,
        );
        assert!(!capped.converged);
        assert!(!capped.is_copyable("Outer"));
    }

    #[test]
    fn settling_on_the_last_allowed_pass_converges() {
        let mut program = structs(vec![struct_decl(
            "Point",
            vec![("x", Type::f64()), ("y", Type::f64())],
        )]);
        let outcome = compute_copy_closure(&mut program, 1);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.is_copyable("Point"));
        assert!(outcome.warning().is_none());
    }

    #[test]
    fn mutual_recursion_is_never_copyable() {
        for cap in [2, 5, 64] {
            let mut program = structs(vec![
                struct_decl("A", vec![("b", Type::aggregate("B"))]),
                struct_decl("B", vec![("a", Type::aggregate("A"))]),
            ]);
            let outcome = compute_copy_closure(&mut program, cap);
            assert!(!outcome.is_copyable("A"));
            assert!(!outcome.is_copyable("B"));
        }
    }

    #[test]
    fn value_cycles_are_found() {
        let program = structs(vec![
            struct_decl("A", vec![("b", Type::aggregate("B"))]),
            struct_decl("B", vec![("a", Type::optional(Type::aggregate("A")))]),
            struct_decl("Node", vec![("next", Type::aggregate("Node"))]),
            struct_decl("List", vec![("items", Type::sequence(Type::aggregate("List")))]),
        ]);
        assert_eq!(
            find_value_cycles(&program),
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["Node".to_string()]
            ]
        );
        let warnings = value_cycle_warnings(&program);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.code == VALUE_CYCLE));
    }

    #[test]
    fn existing_copy_tag_is_kept_without_duplicates() {
        let mut tagged = struct_decl("Handle", vec![("name", Type::owned_text())]);
        tagged.derives = vec!["Copy".to_string()];
        let mut program = structs(vec![tagged]);
        let outcome = compute_copy_closure(&mut program, DEFAULT_MAX_ITERATIONS);
        assert!(outcome.is_copyable("Handle"));
        assert_eq!(
            program.find_struct("Handle").expect("Handle").derives,
            vec!["Copy".to_string(), "Clone".to_string()]
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const NAMES: [&str; 4] = ["S0", "S1", "S2", "S3"];

        fn field_ty() -> impl Strategy<Value = Type> {
            prop_oneof![
                Just(Type::f64()),
                Just(Type::bool()),
                Just(Type::owned_text()),
                Just(Type::sequence(Type::f64())),
                (0usize..4).prop_map(|i| Type::aggregate(NAMES[i])),
            ]
        }

        fn program() -> impl Strategy<Value = Program> {
            proptest::collection::vec(proptest::collection::vec(field_ty(), 0..3), 4).prop_map(
                |fields| {
                    let decls = fields
                        .into_iter()
                        .enumerate()
                        .map(|(i, tys)| {
                            let named = tys
                                .into_iter()
                                .enumerate()
                                .map(|(j, t)| (format!("f{j}"), t))
                                .collect::<Vec<_>>();
                            let fields = named.iter().map(|(n, t)| (n.as_str(), t.clone())).collect();
                            Decl::Struct(struct_decl(NAMES[i], fields))
                        })
                        .collect();
                    Program::new(decls)
                },
            )
        }

        proptest! {
            #[test]
            fn closure_is_sound_and_idempotent(mut p in program()) {
                let first = compute_copy_closure(&mut p, DEFAULT_MAX_ITERATIONS);
                prop_assert!(first.converged);

                let registry = TypeRegistry::from_program(&p);
                let mut set = CopySet::with_registry(&registry);
                for n in &first.copyable {
                    set.insert(n);
                }
                for s in p.structs() {
                    let all_fields = s.fields.iter().all(|f| set.admits(&f.ty));
                    prop_assert_eq!(first.is_copyable(&s.name), all_fields);
                }

                let before = p.clone();
                let second = compute_copy_closure(&mut p, DEFAULT_MAX_ITERATIONS);
                prop_assert_eq!(&second.copyable, &first.copyable);
                prop_assert_eq!(p, before);
            }
        }
    }
}
