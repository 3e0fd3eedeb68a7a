use crate::{store::Store, Error, Result};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use authz_controller_core::ResolvedTemplate;
use authz_controller_k8s_api::management::RoleTemplate;
use std::sync::Arc;

/// Flattens role templates, memoizing every template it fetches.
///
/// A resolver is meant to live for a single reconciliation pass: the memo is never invalidated,
/// so templates changed after they were first fetched are not observed.
pub struct Resolver<'s, S> {
    store: &'s S,
    templates: HashMap<String, Arc<RoleTemplate>>,
}

struct Frame {
    name: String,
    children: Vec<String>,
    next: usize,
}

// === impl Resolver ===

impl<'s, S: Store> Resolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            templates: HashMap::new(),
        }
    }

    /// Resolves `root` into the union of the rules of every non-builtin template it reaches and
    /// the names of the builtin templates it reaches.
    ///
    /// Builtin templates are terminal. A template that references one of its own ancestors fails
    /// with [`Error::Cycle`]; a template reachable along several paths is expanded once.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn resolve(&mut self, root: &str) -> Result<ResolvedTemplate> {
        let template = self.fetch(root).await?;
        if template.spec.builtin {
            return Ok(ResolvedTemplate::builtin(root));
        }

        let mut resolved = ResolvedTemplate {
            name: root.to_string(),
            ..Default::default()
        };
        resolved.templates.insert(root.to_string());
        resolved.rules.extend(template.spec.rules.iter().cloned());

        let mut expanded = HashSet::new();
        let mut stack = vec![Frame {
            name: root.to_string(),
            children: template.spec.role_template_names.clone(),
            next: 0,
        }];

        loop {
            let child = match stack.last_mut() {
                None => break,
                Some(frame) if frame.next == frame.children.len() => {
                    expanded.insert(frame.name.clone());
                    stack.pop();
                    continue;
                }
                Some(frame) => {
                    frame.next += 1;
                    frame.children[frame.next - 1].clone()
                }
            };

            if stack.iter().any(|f| f.name == child) {
                let path = stack
                    .iter()
                    .map(|f| f.name.clone())
                    .chain(Some(child))
                    .collect();
                return Err(Error::Cycle(path));
            }
            if expanded.contains(&child) {
                continue;
            }

            let template = self.fetch(&child).await?;
            if template.spec.builtin {
                resolved.builtins.insert(child.clone());
                expanded.insert(child);
                continue;
            }

            resolved.templates.insert(child.clone());
            resolved.rules.extend(template.spec.rules.iter().cloned());
            stack.push(Frame {
                name: child,
                children: template.spec.role_template_names.clone(),
                next: 0,
            });
        }

        tracing::debug!(
            rules = resolved.rules.len(),
            templates = resolved.templates.len(),
            builtins = resolved.builtins.len(),
            "Resolved"
        );
        Ok(resolved)
    }

    async fn fetch(&mut self, name: &str) -> Result<Arc<RoleTemplate>> {
        if let Some(template) = self.templates.get(name) {
            return Ok(template.clone());
        }
        let template = self
            .store
            .get::<RoleTemplate>(None, name)
            .await?
            .map(Arc::new)
            .ok_or_else(|| Error::not_found("RoleTemplate", name))?;
        self.templates.insert(name.to_string(), template.clone());
        Ok(template)
    }
}
