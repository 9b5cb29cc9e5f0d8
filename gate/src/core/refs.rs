//! Branch substitution inside proposed change references.
//!
//! The merge queue scopes its proposed refs by branch (e.g.
//! `refs/zuul/stable/foo/Z6c2b...`). When the gate retargets a project to a
//! different branch it derives the candidate ref by blind textual
//! substitution of the branch name. This is intentionally not a semantic
//! rewrite: if the branch text happens to appear elsewhere in the token the
//! substitution hits it too, and downstream resolution simply fails to find
//! the mangled ref. The tests below pin that behavior.

/// Replace every occurrence of `from` with `to` inside `reference`.
///
/// An empty `from` leaves the reference untouched.
pub fn rewrite_branch(reference: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return reference.to_string();
    }
    reference.replace(from, to)
}
