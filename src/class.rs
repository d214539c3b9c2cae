//! Class runtime and the process-wide class table (spec §3 "Class runtime",
//! §5 "create-and-link-parent critical section").

use crate::function::{ClassDescriptor, PropertyDecl};
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// A linked, ready-to-use class (parent properties/constants/statics
/// already merged in). Spec §3: "Inheritance is resolved lazily on first
/// touch ... parent properties/constants/static-props are copied in
/// without overwriting child declarations."
#[derive(Debug, Clone)]
pub struct ClassRuntime {
    pub name: String,
    pub parent_name: Option<String>,
    pub properties: HashMap<String, PropertyDecl>,
    pub static_props: HashMap<String, Value>,
    pub constants: HashMap<String, Value>,
    pub interfaces: HashSet<String>,
    pub descriptor: Arc<ClassDescriptor>,
    linked: bool,
}

impl ClassRuntime {
    fn from_descriptor(descriptor: Arc<ClassDescriptor>) -> Self {
        let static_props = descriptor
            .properties
            .iter()
            .filter(|(_, p)| p.is_static)
            .map(|(name, p)| (name.clone(), p.default_value.clone()))
            .collect();
        Self {
            name: descriptor.name.clone(),
            parent_name: descriptor.parent_name.clone(),
            properties: descriptor.properties.clone(),
            static_props,
            constants: descriptor.constants.clone(),
            interfaces: descriptor.interfaces.clone(),
            descriptor,
            linked: false,
        }
    }

    /// Default instance properties (non-static), used to seed a freshly
    /// constructed object before constructor parameters run.
    pub fn instance_defaults(&self) -> HashMap<String, Value> {
        self.properties
            .iter()
            .filter(|(_, p)| !p.is_static)
            .map(|(name, p)| (name.clone(), p.default_value.clone()))
            .collect()
    }

    pub fn find_constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub fn find_property_decl(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.get(name)
    }
}

/// The process-wide class registry. Populated once at VM construction
/// (descriptors registered via [`ClassTable::declare`]) and merged into
/// each per-script context on execute (spec §6 "Persisted/in-process
/// state"). Thread-safe so the goroutine executor (C8) and the main loop
/// can both resolve classes without coarse locking.
#[derive(Clone, Default)]
pub struct ClassTable {
    descriptors: Arc<RwLock<HashMap<String, Arc<ClassDescriptor>>>>,
    linked: Arc<RwLock<HashMap<String, Arc<RwLock<ClassRuntime>>>>>,
    /// Traits declared via `DECLARE_TRAIT`/registered by the embedder,
    /// pulled into a class's descriptor by `USE_TRAIT` before linking.
    traits: Arc<RwLock<HashMap<String, Arc<ClassDescriptor>>>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers compile-time class metadata. Called by the embedder before
    /// execution (or by `DECLARE_CLASS` handlers during a script run).
    pub fn declare(&self, descriptor: ClassDescriptor) {
        let name = descriptor.name.clone();
        self.descriptors
            .write()
            .expect("class table poisoned")
            .insert(name, Arc::new(descriptor));
    }

    pub fn has_descriptor(&self, name: &str) -> bool {
        self.descriptors
            .read()
            .expect("class table poisoned")
            .contains_key(name)
    }

    /// Raw, unlinked descriptor for `name`, if registered. Used by the
    /// class-declaration opcodes to seed `current_class` with any
    /// embedder-supplied methods before the script's own
    /// property/constant/interface declarations layer on top.
    pub fn descriptor(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.descriptors
            .read()
            .expect("class table poisoned")
            .get(name)
            .cloned()
    }

    pub fn declare_trait(&self, descriptor: ClassDescriptor) {
        let name = descriptor.name.clone();
        self.traits
            .write()
            .expect("class table poisoned")
            .insert(name, Arc::new(descriptor));
    }

    pub fn trait_descriptor(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.traits
            .read()
            .expect("class table poisoned")
            .get(name)
            .cloned()
    }

    /// Returns the linked runtime for `name`, creating and linking it (and
    /// recursively its ancestors) on first touch. Uses load-or-store
    /// semantics: if two callers race to create the same class, the second
    /// one's work collapses onto the first (spec §5).
    pub fn resolve(&self, name: &str) -> Option<Arc<RwLock<ClassRuntime>>> {
        if let Some(existing) = self.linked.read().expect("class table poisoned").get(name) {
            return Some(Arc::clone(existing));
        }

        let descriptor = Arc::clone(
            self.descriptors
                .read()
                .expect("class table poisoned")
                .get(name)?,
        );

        let mut runtime = ClassRuntime::from_descriptor(Arc::clone(&descriptor));
        if let Some(parent_name) = runtime.parent_name.clone() {
            if let Some(parent) = self.resolve(&parent_name) {
                let parent = parent.read().expect("class runtime poisoned");
                for (pname, pdecl) in &parent.properties {
                    runtime
                        .properties
                        .entry(pname.clone())
                        .or_insert_with(|| pdecl.clone());
                }
                for (pname, pval) in &parent.static_props {
                    runtime
                        .static_props
                        .entry(pname.clone())
                        .or_insert_with(|| pval.clone());
                }
                for (cname, cval) in &parent.constants {
                    runtime
                        .constants
                        .entry(cname.clone())
                        .or_insert_with(|| cval.clone());
                }
                runtime.interfaces.extend(parent.interfaces.iter().cloned());
            }
        }
        runtime.linked = true;

        let mut linked = self.linked.write().expect("class table poisoned");
        // Another thread may have linked it first; keep theirs (load-or-store).
        let entry = linked
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(runtime)));
        Some(Arc::clone(entry))
    }

    /// `instanceof` check walking the parent chain and interface set.
    pub fn is_instance_of(&self, class_name: &str, target: &str) -> bool {
        if class_name.eq_ignore_ascii_case(target) {
            return true;
        }
        let Some(runtime) = self.resolve(class_name) else {
            return false;
        };
        let runtime = runtime.read().expect("class runtime poisoned");
        if runtime
            .interfaces
            .iter()
            .any(|i| i.eq_ignore_ascii_case(target))
        {
            return true;
        }
        match &runtime.parent_name {
            Some(parent) => self.is_instance_of(parent, target),
            None => false,
        }
    }

    /// Finds the descriptor that declares `method` by walking up the parent
    /// chain (used for ordinary, non-static method dispatch).
    pub fn find_method(
        &self,
        class_name: &str,
        method: &str,
    ) -> Option<(String, Arc<crate::function::FunctionDescriptor>)> {
        let runtime = self.resolve(class_name)?;
        let runtime = runtime.read().expect("class runtime poisoned");
        if let Some(m) = runtime.descriptor.method(method) {
            return Some((runtime.name.clone(), Arc::clone(m)));
        }
        let parent = runtime.parent_name.clone()?;
        drop(runtime);
        self.find_method(&parent, method)
    }
}
