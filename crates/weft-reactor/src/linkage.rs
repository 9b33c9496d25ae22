//! Module dependency resolution: a deterministic processing order for the
//! supplied sources, computed from declared headers before linkage begins.
//!
//! Every check here operates on raw declared text (module names, revision
//! and import substatements); nothing depends on phase state, which is why
//! the resolver can reject a broken source set before any inference runs.

use std::collections::HashMap;

use weft_model::{Revision, SemVer};

use crate::build::BuildContext;
use crate::context::CtxId;
use crate::error::{ReactorError, Result};
use crate::support::latest_revision;

/// One module or submodule header as declared.
struct ModuleHeader {
    name: String,
    revision: Option<Revision>,
    semver: Option<SemVer>,
    root: CtxId,
    submodule: bool,
}

/// Compute the order in which sources are driven through the phases: every
/// module sorts after all modules it imports and all submodules it
/// includes, ties broken by supplied order. Returns indices into `roots`.
pub(crate) fn resolve_order(build: &BuildContext, roots: &[CtxId]) -> Result<Vec<usize>> {
    let headers = collect_headers(build, roots)?;
    reject_duplicates(build, &headers)?;

    // Adjacency: edges[i] holds the header indices source i depends on.
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); headers.len()];
    for (index, header) in headers.iter().enumerate() {
        for import in dependency_decls(build, header.root, "import") {
            let target = resolve_import(build, &headers, header, &import)?;
            edges[index].push(target);
        }
        for include in dependency_decls(build, header.root, "include") {
            let target = resolve_include(build, &headers, &include)?;
            edges[index].push(target);
        }
    }

    toposort(&headers, &edges)
}

struct ImportDecl {
    name: String,
    revision: Option<Revision>,
    semver: Option<SemVer>,
    ctx: CtxId,
}

fn collect_headers(build: &BuildContext, roots: &[CtxId]) -> Result<Vec<ModuleHeader>> {
    let mut headers = Vec::with_capacity(roots.len());
    for &root in roots {
        let ctx = build.arena.get(root);
        let name = ctx.raw_argument().ok_or_else(|| ReactorError::InvalidArgument {
            keyword: ctx.keyword().to_owned(),
            message: "missing module name".to_owned(),
            at: ctx.source_ref().clone(),
        })?;
        let semver = parse_semver(build, root)?;
        headers.push(ModuleHeader {
            name: name.to_owned(),
            revision: latest_revision(build, root)?,
            semver,
            root,
            submodule: ctx.keyword() == "submodule",
        });
    }
    Ok(headers)
}

fn parse_semver(build: &BuildContext, ctx: CtxId) -> Result<Option<SemVer>> {
    let Some(raw) = build.arena.declared_child_arg(ctx, "semantic-version") else {
        return Ok(None);
    };
    SemVer::parse(&raw)
        .map(Some)
        .map_err(|e| ReactorError::InvalidArgument {
            keyword: "semantic-version".to_owned(),
            message: e.to_string(),
            at: build.arena.get(ctx).source_ref().clone(),
        })
}

fn reject_duplicates(build: &BuildContext, headers: &[ModuleHeader]) -> Result<()> {
    let mut seen: HashMap<(&str, Option<Revision>), &ModuleHeader> = HashMap::new();
    for header in headers {
        if let Some(first) = seen.insert((&header.name, header.revision), header) {
            let shown = match header.revision {
                Some(revision) => format!("{} (revision {revision})", header.name),
                None => header.name.clone(),
            };
            return Err(ReactorError::SemanticConflict {
                message: format!("module `{shown}` declared twice"),
                first: build.arena.get(first.root).source_ref().clone(),
                second: build.arena.get(header.root).source_ref().clone(),
            });
        }
    }
    Ok(())
}

fn dependency_decls(build: &BuildContext, root: CtxId, keyword: &str) -> Vec<ImportDecl> {
    build
        .arena
        .get(root)
        .declared_children()
        .iter()
        .copied()
        .filter(|&child| build.arena.get(child).keyword() == keyword)
        .map(|child| ImportDecl {
            name: build
                .arena
                .get(child)
                .raw_argument()
                .unwrap_or_default()
                .to_owned(),
            revision: build
                .arena
                .declared_child_arg(child, "revision-date")
                .and_then(|raw| Revision::parse(&raw).ok()),
            semver: build
                .arena
                .declared_child_arg(child, "semantic-version")
                .and_then(|raw| SemVer::parse(&raw).ok()),
            ctx: child,
        })
        .collect()
}

/// Pick the header index an import resolves to.
fn resolve_import(
    build: &BuildContext,
    headers: &[ModuleHeader],
    importing: &ModuleHeader,
    import: &ImportDecl,
) -> Result<usize> {
    let at = build.arena.get(import.ctx).source_ref().clone();
    let candidates: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.submodule && h.name == import.name)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return Err(ReactorError::UnresolvableReference {
            reference: format!("imported module `{}`", import.name),
            at,
        });
    }

    if let Some(requested) = import.semver {
        let chosen = candidates.iter().copied().find(|&i| {
            headers[i]
                .semver
                .is_some_and(|declared| declared.satisfies(requested))
        });
        return chosen.ok_or_else(|| ReactorError::IncompatibleImport {
            import: import.name.clone(),
            importing: importing.name.clone(),
            requested: requested.to_string(),
            considered: candidates
                .iter()
                .map(|&i| match headers[i].semver {
                    Some(declared) => declared.to_string(),
                    None => "<none>".to_owned(),
                })
                .collect(),
            at,
        });
    }

    match import.revision {
        Some(revision) => candidates
            .iter()
            .copied()
            .find(|&i| headers[i].revision == Some(revision))
            .ok_or_else(|| ReactorError::UnresolvableReference {
                reference: format!("imported module `{}` (revision {revision})", import.name),
                at,
            }),
        None => {
            if candidates.len() > 1 {
                // Best-effort policy for revisionless imports of a multiply
                // supplied module: first in supplied order.
                tracing::warn!(
                    import = %import.name,
                    importing = %importing.name,
                    "revisionless import matches several revisions; using the first supplied"
                );
            }
            Ok(candidates[0])
        }
    }
}

/// Pick the header index an include resolves to.
fn resolve_include(
    build: &BuildContext,
    headers: &[ModuleHeader],
    include: &ImportDecl,
) -> Result<usize> {
    let at = build.arena.get(include.ctx).source_ref().clone();
    let candidates: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.submodule && h.name == include.name)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return Err(ReactorError::UnresolvableReference {
            reference: format!("included submodule `{}`", include.name),
            at,
        });
    }
    match include.revision {
        Some(revision) => candidates
            .iter()
            .copied()
            .find(|&i| headers[i].revision == Some(revision))
            .ok_or_else(|| ReactorError::UnresolvableReference {
                reference: format!(
                    "included submodule `{}` (revision {revision})",
                    include.name
                ),
                at,
            }),
        None => Ok(candidates[0]),
    }
}

/// Stable Kahn topological sort; leftover nodes mean a cycle.
fn toposort(headers: &[ModuleHeader], edges: &[Vec<usize>]) -> Result<Vec<usize>> {
    let count = headers.len();
    let mut remaining_deps = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, deps) in edges.iter().enumerate() {
        for &dep in deps {
            remaining_deps[index] += 1;
            if dep != index {
                dependents[dep].push(index);
            }
            // A self-import's dependency count is never released, so the
            // module surfaces in the cycle report.
        }
    }

    let mut order = Vec::with_capacity(count);
    let mut ready: Vec<usize> = (0..count).filter(|&i| remaining_deps[i] == 0).collect();
    // `ready` is kept sorted so ties resolve by supplied order.
    while let Some(&next) = ready.first() {
        ready.remove(0);
        order.push(next);
        for &dependent in &dependents[next] {
            remaining_deps[dependent] -= 1;
            if remaining_deps[dependent] == 0 {
                let pos = ready.partition_point(|&i| i < dependent);
                ready.insert(pos, dependent);
            }
        }
    }

    if order.len() != count {
        let mut cyclic: Vec<String> = (0..count)
            .filter(|i| !order.contains(i))
            .map(|i| headers[i].name.clone())
            .collect();
        cyclic.sort();
        return Err(ReactorError::ImportCycle { modules: cyclic });
    }
    Ok(order)
}
