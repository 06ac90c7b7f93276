use std::collections::HashMap;

use crate::class::{Class, Variable};
use crate::error::SchemaError;
use crate::method::{Argument, Method};
use crate::value::ValueType;

/// A fully-constructed, immutable schema: the set of classes (with their
/// inheritance chain and variables) and methods (with their arguments) that
/// one world's objects conform to.
///
/// Schemas are produced by a schema parser external to this crate (spec.md
/// §1, "Out of scope") or, for tests and embedding hosts that build a
/// schema programmatically, by [`SchemaBuilder`]. Either way the core only
/// ever sees a `Schema` that has already satisfied the invariants in
/// spec.md §3.
#[derive(Debug, Clone)]
pub struct Schema {
    classes: Vec<Class>,
    methods: Vec<Method>,
    class_by_name: HashMap<String, u8>,
    method_by_name: HashMap<String, u8>,
    content_hash: u32,
}

impl Schema {
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn class(&self, ordinal: u8) -> Option<&Class> {
        self.classes.get(ordinal as usize)
    }

    pub fn class_by_name(&self, name: &str) -> Option<&Class> {
        self.class_by_name.get(name).map(|&i| &self.classes[i as usize])
    }

    pub fn method(&self, ordinal: u8) -> Option<&Method> {
        self.methods.get(ordinal as usize)
    }

    pub fn method_by_name(&self, name: &str) -> Option<&Method> {
        self.method_by_name.get(name).map(|&i| &self.methods[i as usize])
    }

    /// True iff `class` (by ordinal) equals or descends from `ancestor`
    /// (by ordinal).
    pub fn class_is_a(&self, class: u8, ancestor: u8) -> bool {
        self.classes
            .get(class as usize)
            .is_some_and(|c| c.descends_from_or_is(ancestor, &self.classes))
    }

    /// Deterministic 32-bit content hash. Two schemas compiled from
    /// equivalent definitions (same classes/variables/methods/arguments,
    /// same ordinals) always produce the same hash; this is the value
    /// exchanged during the handshake (spec.md §6) to gate connections
    /// between peers running incompatible schemas.
    pub fn content_hash(&self) -> u32 {
        self.content_hash
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn compute_content_hash(classes: &[Class], methods: &[Method]) -> u32 {
    let mut buf = Vec::new();
    for class in classes {
        buf.extend_from_slice(class.name.as_bytes());
        buf.push(0);
        buf.push(class.parent.map_or(0xFF, |_| 0x01));
        buf.push(class.own_variable_count);
        for var in &class.variables[class.variables.len() - class.own_variable_count as usize..]
        {
            buf.extend_from_slice(var.name.as_bytes());
            buf.push(0);
            buf.push(var.value_type.tag());
        }
    }
    for method in methods {
        buf.extend_from_slice(method.name.as_bytes());
        buf.push(0);
        buf.push(method.arguments.len() as u8);
        for arg in &method.arguments {
            buf.extend_from_slice(arg.name.as_bytes());
            buf.push(0);
            buf.push(arg.value_type.tag());
        }
    }
    fnv1a(&buf)
}

struct ClassDef {
    name: String,
    parent: Option<String>,
    variables: Vec<(String, ValueType)>,
}

struct MethodDef {
    name: String,
    arguments: Vec<(String, ValueType)>,
}

/// Builder for assembling a [`Schema`] programmatically (used by tests and
/// by hosts that construct a schema in-process rather than reading it from
/// a parsed interface-specification file).
///
/// Classes must be added before any subclass that names them as parent;
/// ordinals are assigned in declaration order, matching the "dense from 0"
/// invariant in spec.md §3.
#[derive(Default)]
pub struct SchemaBuilder {
    classes: Vec<ClassDef>,
    methods: Vec<MethodDef>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(
        mut self,
        name: impl Into<String>,
        parent: Option<&str>,
        variables: &[(&str, ValueType)],
    ) -> Self {
        self.classes.push(ClassDef {
            name: name.into(),
            parent: parent.map(str::to_owned),
            variables: variables
                .iter()
                .map(|&(n, t)| (n.to_owned(), t))
                .collect(),
        });
        self
    }

    pub fn method(mut self, name: impl Into<String>, arguments: &[(&str, ValueType)]) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            arguments: arguments.iter().map(|&(n, t)| (n.to_owned(), t)).collect(),
        });
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.classes.len() > 256 {
            return Err(SchemaError::TooManyClasses);
        }
        if self.methods.len() > 256 {
            return Err(SchemaError::TooManyMethods);
        }

        let mut class_by_name = HashMap::new();
        let mut classes: Vec<Class> = Vec::with_capacity(self.classes.len());

        for (ordinal, def) in self.classes.into_iter().enumerate() {
            let ordinal = ordinal as u8;
            if class_by_name.contains_key(&def.name) {
                return Err(SchemaError::DuplicateClassName(def.name));
            }

            let (parent_ordinal, mut variables, mut var_by_name) = match &def.parent {
                Some(parent_name) => {
                    let &parent_ord = class_by_name
                        .get(parent_name)
                        .ok_or_else(|| {
                            SchemaError::UnknownParent(def.name.clone(), parent_name.clone())
                        })?;
                    let parent: &Class = &classes[parent_ord as usize];
                    (Some(parent_ord), parent.variables.clone(), parent.var_by_name.clone())
                }
                None => (None, Vec::new(), HashMap::new()),
            };

            let own_start = variables.len();
            for (name, value_type) in def.variables {
                if var_by_name.contains_key(&name) {
                    return Err(SchemaError::DuplicateVariableName(def.name.clone(), name));
                }
                let var_ordinal = variables.len();
                if var_ordinal >= 256 {
                    return Err(SchemaError::TooManyVariables(def.name));
                }
                var_by_name.insert(name.clone(), var_ordinal as u8);
                variables.push(Variable {
                    ordinal: var_ordinal as u8,
                    name,
                    value_type,
                });
            }
            let own_variable_count = (variables.len() - own_start) as u8;

            classes.push(Class {
                ordinal,
                name: def.name.clone(),
                parent: parent_ordinal,
                variables,
                own_variable_count,
                var_by_name,
            });
            class_by_name.insert(def.name, ordinal);
        }

        let mut method_by_name = HashMap::new();
        let mut methods = Vec::with_capacity(self.methods.len());
        for (ordinal, def) in self.methods.into_iter().enumerate() {
            let ordinal = ordinal as u8;
            if method_by_name.contains_key(&def.name) {
                return Err(SchemaError::DuplicateMethodName(def.name));
            }
            if def.arguments.len() > 256 {
                return Err(SchemaError::TooManyArguments(def.name));
            }
            let mut arg_by_name = HashMap::new();
            let mut arguments = Vec::with_capacity(def.arguments.len());
            for (i, (name, value_type)) in def.arguments.into_iter().enumerate() {
                if arg_by_name.contains_key(&name) {
                    return Err(SchemaError::DuplicateArgumentName(def.name.clone(), name));
                }
                arg_by_name.insert(name.clone(), i as u8);
                arguments.push(Argument {
                    ordinal: i as u8,
                    name,
                    value_type,
                });
            }
            methods.push(Method {
                ordinal,
                name: def.name.clone(),
                arguments,
                arg_by_name,
            });
            method_by_name.insert(def.name, ordinal);
        }

        let content_hash = compute_content_hash(&classes, &methods);

        Ok(Schema {
            classes,
            methods,
            class_by_name,
            method_by_name,
            content_hash,
        })
    }
}
