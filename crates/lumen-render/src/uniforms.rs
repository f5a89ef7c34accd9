//! Double-buffered effect uniforms.
//!
//! Writers (a UI thread, a config reload) go through [`Uniforms::set`], which
//! only touches the pending buffer. The composer calls [`Uniforms::commit`]
//! between frames; passes read the committed [`UniformValues`] snapshot, so a
//! write never lands in the middle of a pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use lumen_core::{LumenError, LumenResult, Mat3};
use lumen_fx::{UniformDecl, UniformType, UniformValue};

/// An immutable set of uniform values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformValues {
    values: BTreeMap<String, UniformValue>,
}

impl UniformValues {
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.values.get(name).copied()
    }

    pub fn f32(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(UniformValue::F32(v)) => v,
            _ => 0.0,
        }
    }

    pub fn vec2(&self, name: &str) -> [f32; 2] {
        match self.get(name) {
            Some(UniformValue::Vec2(v)) => v,
            _ => [0.0; 2],
        }
    }

    pub fn vec3(&self, name: &str) -> [f32; 3] {
        match self.get(name) {
            Some(UniformValue::Vec3(v)) => v,
            _ => [0.0; 3],
        }
    }

    pub fn vec4(&self, name: &str) -> [f32; 4] {
        match self.get(name) {
            Some(UniformValue::Vec4(v)) => v,
            _ => [0.0; 4],
        }
    }

    pub fn mat3(&self, name: &str) -> Mat3 {
        match self.get(name) {
            Some(UniformValue::Mat3(m)) => m,
            _ => Mat3::IDENTITY,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug)]
struct Pending {
    values: UniformValues,
    dirty: bool,
}

pub struct Uniforms {
    types: BTreeMap<String, UniformType>,
    pending: Mutex<Pending>,
    current: RwLock<Arc<UniformValues>>,
}

impl Uniforms {
    pub fn new(decls: impl IntoIterator<Item = UniformDecl>) -> Self {
        let mut types = BTreeMap::new();
        let mut values = UniformValues::default();
        for decl in decls {
            types.insert(decl.name.clone(), decl.ty());
            values.values.insert(decl.name, decl.default);
        }
        Self {
            types,
            current: RwLock::new(Arc::new(values.clone())),
            pending: Mutex::new(Pending {
                values,
                dirty: false,
            }),
        }
    }

    /// Stage a new value. Visible to passes after the next [`Uniforms::commit`].
    pub fn set(&self, name: &str, value: UniformValue) -> LumenResult<()> {
        let Some(ty) = self.types.get(name) else {
            return Err(LumenError::InvalidArgument(format!("unknown uniform '{name}'")));
        };
        if *ty != value.ty() {
            return Err(LumenError::InvalidArgument(format!(
                "uniform '{name}' is {:?}, got {:?}",
                ty,
                value.ty()
            )));
        }
        let mut pending = self.pending.lock();
        pending.values.values.insert(name.to_string(), value);
        pending.dirty = true;
        Ok(())
    }

    /// Publish pending writes. Returns whether anything changed.
    pub fn commit(&self) -> bool {
        let mut pending = self.pending.lock();
        if !pending.dirty {
            return false;
        }
        *self.current.write() = Arc::new(pending.values.clone());
        pending.dirty = false;
        true
    }

    /// The values of the current frame.
    pub fn snapshot(&self) -> Arc<UniformValues> {
        self.current.read().clone()
    }

    pub fn has(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

impl std::fmt::Debug for Uniforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uniforms")
            .field("current", &self.snapshot())
            .finish()
    }
}
