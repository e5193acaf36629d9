//! Topological sort of the resolver dependency DAG, run once at startup.

use std::collections::{HashMap, HashSet};

use crate::def::ResolverDef;
use crate::error::{ResolverError, ResolverResult};

pub fn sort(defs: Vec<ResolverDef>) -> ResolverResult<Vec<ResolverDef>> {
    let mut by_name: HashMap<String, ResolverDef> = HashMap::new();
    for def in defs {
        let name = def.name.clone();
        if by_name.insert(name.clone(), def).is_some() {
            return Err(ResolverError::DuplicateName(name));
        }
    }
    for def in by_name.values() {
        for dep in &def.depends_on {
            if !by_name.contains_key(dep) {
                return Err(ResolverError::UnknownDependency(
                    def.name.clone(),
                    dep.clone(),
                ));
            }
        }
    }

    let mut ordered = Vec::with_capacity(by_name.len());
    let mut visited: HashSet<String> = HashSet::new();
    let mut on_stack: Vec<String> = Vec::new();

    let mut names: Vec<String> = by_name.keys().cloned().collect();
    names.sort();

    for name in names {
        visit(&name, &by_name, &mut visited, &mut on_stack, &mut ordered)?;
    }

    Ok(ordered)
}

fn visit(
    name: &str,
    by_name: &HashMap<String, ResolverDef>,
    visited: &mut HashSet<String>,
    on_stack: &mut Vec<String>,
    ordered: &mut Vec<ResolverDef>,
) -> ResolverResult<()> {
    if visited.contains(name) {
        return Ok(());
    }
    if on_stack.contains(&name.to_string()) {
        let mut cycle = on_stack.clone();
        cycle.push(name.to_string());
        return Err(ResolverError::Cycle(cycle));
    }
    on_stack.push(name.to_string());
    let def = &by_name[name];
    for dep in &def.depends_on {
        visit(dep, by_name, visited, on_stack, ordered)?;
    }
    on_stack.pop();
    visited.insert(name.to_string());
    ordered.push(def.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, depends_on: &[&str]) -> ResolverDef {
        ResolverDef {
            name: name.into(),
            sql: "select 1".into(),
            params: vec![],
            injects: vec![],
            required: true,
            unique: false,
            cache_ttl_secs: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn producers_come_before_consumers() {
        let defs = vec![def("child", &["parent"]), def("parent", &[])];
        let sorted = sort(defs).unwrap();
        let names: Vec<_> = sorted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["parent", "child"]);
    }

    #[test]
    fn detects_cycle() {
        let defs = vec![def("a", &["b"]), def("b", &["a"])];
        assert!(matches!(sort(defs), Err(ResolverError::Cycle(_))));
    }

    #[test]
    fn detects_unknown_dependency() {
        let defs = vec![def("a", &["missing"])];
        assert!(matches!(
            sort(defs),
            Err(ResolverError::UnknownDependency(_, _))
        ));
    }

    #[test]
    fn independent_resolvers_keep_stable_order() {
        let defs = vec![def("b", &[]), def("a", &[])];
        let sorted = sort(defs).unwrap();
        let names: Vec<_> = sorted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
