//! An owned table of known data types, looked up by full name or by `(kind, id)`.
//!
//! Signatures are computed once, at registration.

use std::{collections::HashMap, sync::Arc};

use num_enum::TryFromPrimitive;

use crate::{
    crc::TransferCrc,
    dsdl::{CompositeType, DsdlType, ServiceType},
    error::SchemaError,
    SERVICE_TYPE_ID_MAX,
};

/// Distinguish between service and message. Matches the service-not-message bit of the CAN ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataTypeKind {
    Message = 0,
    Service = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefinition {
    Message(Arc<CompositeType>),
    Service(Arc<ServiceType>),
}

/// A registered data type.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredType {
    pub id: u16,
    pub definition: TypeDefinition,
    pub signature: u64,
}

impl RegisteredType {
    pub fn kind(&self) -> DataTypeKind {
        match self.definition {
            TypeDefinition::Message(_) => DataTypeKind::Message,
            TypeDefinition::Service(_) => DataTypeKind::Service,
        }
    }

    pub fn full_name(&self) -> &str {
        match &self.definition {
            TypeDefinition::Message(m) => m.full_name(),
            TypeDefinition::Service(s) => s.full_name(),
        }
    }

    /// The transfer CRC seeded with this type's signature.
    pub fn base_crc(&self) -> u16 {
        TransferCrc::new_with_signature(self.signature).value
    }

    pub fn as_message(&self) -> Option<&Arc<CompositeType>> {
        match &self.definition {
            TypeDefinition::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Arc<ServiceType>> {
        match &self.definition {
            TypeDefinition::Service(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<RegisteredType>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<(DataTypeKind, u16), usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `u16` is a valid message data type id.
    pub fn register_message(&mut self, id: u16, ty: CompositeType) -> Result<&RegisteredType, SchemaError> {
        check_acyclic(ty.full_name(), ty.fields().iter().map(|f| f.ty()))?;

        let signature = ty.data_type_signature();
        self.insert(RegisteredType {
            id,
            definition: TypeDefinition::Message(Arc::new(ty)),
            signature,
        })
    }

    pub fn register_service(&mut self, id: u16, ty: ServiceType) -> Result<&RegisteredType, SchemaError> {
        if id > SERVICE_TYPE_ID_MAX as u16 {
            return Err(SchemaError::TypeIdOutOfRange { kind: "service", id });
        }
        let fields = ty.request().fields().iter().chain(ty.response().fields());
        check_acyclic(ty.full_name(), fields.map(|f| f.ty()))?;

        let signature = ty.data_type_signature();
        self.insert(RegisteredType {
            id,
            definition: TypeDefinition::Service(Arc::new(ty)),
            signature,
        })
    }

    fn insert(&mut self, entry: RegisteredType) -> Result<&RegisteredType, SchemaError> {
        let kind = entry.kind();

        if self.by_name.contains_key(entry.full_name()) {
            return Err(SchemaError::DuplicateType(entry.full_name().to_owned()));
        }
        if self.by_id.contains_key(&(kind, entry.id)) {
            let kind = match kind {
                DataTypeKind::Message => "message",
                DataTypeKind::Service => "service",
            };
            return Err(SchemaError::DuplicateTypeId { kind, id: entry.id });
        }

        let index = self.types.len();
        self.by_name.insert(entry.full_name().to_owned(), index);
        self.by_id.insert((kind, entry.id), index);
        self.types.push(entry);

        Ok(&self.types[index])
    }

    pub fn by_name(&self, full_name: &str) -> Option<&RegisteredType> {
        self.by_name.get(full_name).map(|i| &self.types[*i])
    }

    pub fn by_id(&self, kind: DataTypeKind, id: u16) -> Option<&RegisteredType> {
        self.by_id.get(&(kind, id)).map(|i| &self.types[*i])
    }

    /// Signature used to seed the transfer CRC, if the type is known.
    pub fn signature(&self, kind: DataTypeKind, id: u16) -> Option<u64> {
        self.by_id(kind, id).map(|t| t.signature)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredType> {
        self.types.iter()
    }
}

/// Reject a type graph in which any composite shows up below itself, `root` included.
fn check_acyclic<'a>(root: &'a str, children: impl Iterator<Item = &'a DsdlType>) -> Result<(), SchemaError> {
    let mut path = vec![root];
    for ty in children {
        check_path(ty, &mut path)?;
    }
    Ok(())
}

fn check_path<'a>(ty: &'a DsdlType, path: &mut Vec<&'a str>) -> Result<(), SchemaError> {
    match ty {
        DsdlType::Array(a) => check_path(a.element(), path),
        DsdlType::Composite(c) => {
            let name = c.full_name();
            if !name.is_empty() && path.contains(&name) {
                return Err(SchemaError::Cycle(name.to_owned()));
            }

            path.push(name);
            for field in c.fields() {
                check_path(field.ty(), path)?;
            }
            path.pop();
            Ok(())
        }
        _ => Ok(()),
    }
}
