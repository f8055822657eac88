use crate::rpc::{ProposeNamespace, ProposeNamespaces};

/// Merges required namespaces into optional ones, key by key.
///
/// Shared keys concatenate their chains without duplicates in first-seen
/// order, and union methods and events in insertion order. Keys present on
/// one side only pass through unchanged.
pub fn merge_required_into_optional(
    required: &ProposeNamespaces,
    optional: &ProposeNamespaces,
) -> ProposeNamespaces {
    let mut merged = optional.clone();

    for (key, namespace) in required.iter() {
        match merged.get_mut(key) {
            Some(existing) => merge_namespace(existing, namespace),
            None => {
                merged.insert(key.clone(), namespace.clone());
            }
        }
    }

    merged
}

fn merge_namespace(target: &mut ProposeNamespace, other: &ProposeNamespace) {
    target.chains = match (target.chains.take(), &other.chains) {
        (None, None) => None,
        (Some(chains), None) => Some(chains),
        (existing, Some(chains)) => {
            let mut merged = existing.unwrap_or_default();
            for chain in chains {
                if !merged.contains(chain) {
                    merged.push(chain.clone());
                }
            }
            Some(merged)
        }
    };

    target.methods.extend(other.methods.iter().cloned());
    target.events.extend(other.events.iter().cloned());
}
