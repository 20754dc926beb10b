use std::collections::BTreeMap;

use tracing::debug;

use crate::decl::Decl;

/// Drops placeholder declarations: types and value entries named by a parameter
/// key, and impl blocks written for a placeholder type. Runs before renaming.
pub fn strip_params(decls: &mut Vec<Decl>, params: &BTreeMap<String, String>) {
    if params.is_empty() {
        return;
    }
    let before = decls.len();
    decls.retain_mut(|decl| match decl {
        Decl::Type(d) => !d.name().is_some_and(|n| params.contains_key(&n)),
        Decl::Values(g) => {
            g.entries
                .retain(|e| !params.contains_key(&e.ident.to_string()));
            !g.entries.is_empty()
        }
        Decl::Impl(imp) => !imp.self_name().is_some_and(|n| params.contains_key(&n)),
        Decl::Func(_) | Decl::Import(_) | Decl::Unnamed(_) | Decl::Other(_) => true,
    });
    debug!(removed = before - decls.len(), "stripped placeholder declarations");
}
