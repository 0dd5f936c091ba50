//! Git command plans for checkout steps
//!
//! Plans are returned as data so they can be inspected and tested without
//! invoking git.

use std::path::Path;

use crate::core::step::Checkout;
use crate::shell::CommandSpec;

/// Resolve a `repository` value to a clone URL
///
/// `owner/repo` shorthand becomes a GitHub HTTPS URL; values that already
/// look like a URL, an SSH remote, or a local path pass through untouched.
pub fn resolve_url(repository: &str) -> String {
    let repository = repository.trim();
    if repository.contains("://")
        || repository.starts_with("git@")
        || Path::new(repository).is_absolute()
    {
        repository.to_string()
    } else {
        format!("https://github.com/{}.git", repository)
    }
}

/// Build the git commands a checkout step must run
///
/// `fresh` selects between cloning into a missing destination and updating
/// an existing clone. The caller has already resolved `dest` inside the
/// workspace and verified what is there.
pub fn checkout_plan(
    checkout: &Checkout,
    dest: &Path,
    workspace_root: &Path,
    fresh: bool,
) -> Vec<CommandSpec> {
    let url = resolve_url(&checkout.repository);
    let mut plan = Vec::new();

    if fresh {
        plan.push(
            CommandSpec::new("git", workspace_root)
                .arg("clone")
                .arg(url.as_str())
                .arg(dest.display().to_string())
                .label("git clone"),
        );
    } else {
        plan.push(
            CommandSpec::new("git", dest)
                .args(["fetch", "--tags", "origin"])
                .label("git fetch"),
        );
    }

    if let Some(reference) = &checkout.reference {
        plan.push(
            CommandSpec::new("git", dest)
                .arg("checkout")
                .arg("--force")
                .arg(reference.as_str())
                .label("git checkout"),
        );
    }

    if checkout.submodules {
        plan.push(
            CommandSpec::new("git", dest)
                .args(["submodule", "update", "--init", "--recursive"])
                .label("git submodule update"),
        );
    }

    plan
}
