//! DSDL type model: the in-memory form of parsed data type definitions, with bit length
//! bounds and data type signatures.
//!
//! [Relevant section of DroneCAN specification](https://dronecan.github.io/Specification/3._Data_structure_description_language/)
//!
//! Types are built programmatically and validated on construction.

use std::{collections::HashSet, sync::Arc};

use crate::{
    crc::{compute_signature, Signature},
    error::SchemaError,
};

/// How out-of-range values are squeezed into a primitive field on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CastMode {
    /// Clamp to the nearest representable value.
    Saturated,
    /// Keep the low bits (two's complement wrap).
    Truncated,
}

impl Default for CastMode {
    fn default() -> Self {
        Self::Saturated
    }
}

impl CastMode {
    fn keyword(&self) -> &'static str {
        match self {
            Self::Saturated => "saturated",
            Self::Truncated => "truncated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrimitiveKind {
    Boolean,
    UnsignedInt,
    SignedInt,
    Float,
}

/// Number of bits needed to hold any count in `0..=max`, ie `ceil(log2(max + 1))`.
pub fn bits_for_count(max: usize) -> u8 {
    (usize::BITS - max.leading_zeros()) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrimitiveType {
    kind: PrimitiveKind,
    bit_len: u8,
    cast_mode: CastMode,
}

impl PrimitiveType {
    pub fn new(kind: PrimitiveKind, bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        let (valid, kind_name) = match kind {
            PrimitiveKind::Boolean => (bit_len == 1, "bool"),
            PrimitiveKind::UnsignedInt => ((2..=64).contains(&bit_len), "uint"),
            PrimitiveKind::SignedInt => ((2..=64).contains(&bit_len), "int"),
            PrimitiveKind::Float => (matches!(bit_len, 16 | 32 | 64), "float"),
        };

        if !valid {
            return Err(SchemaError::InvalidBitLength {
                kind: kind_name,
                bit_len,
            });
        }

        Ok(Self {
            kind,
            bit_len,
            cast_mode,
        })
    }

    pub fn boolean() -> Self {
        Self {
            kind: PrimitiveKind::Boolean,
            bit_len: 1,
            cast_mode: CastMode::Saturated,
        }
    }

    pub fn uint(bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        Self::new(PrimitiveKind::UnsignedInt, bit_len, cast_mode)
    }

    pub fn int(bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        Self::new(PrimitiveKind::SignedInt, bit_len, cast_mode)
    }

    pub fn float(bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        Self::new(PrimitiveKind::Float, bit_len, cast_mode)
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    pub fn bit_len(&self) -> u8 {
        self.bit_len
    }

    pub fn cast_mode(&self) -> CastMode {
        self.cast_mode
    }

    /// Inclusive integer range of the type. Floats report the range of their integral
    /// values that are exactly representable everywhere, which is only used for constants.
    pub fn int_range(&self) -> (i128, i128) {
        match self.kind {
            PrimitiveKind::Boolean => (0, 1),
            PrimitiveKind::UnsignedInt => (0, (1i128 << self.bit_len) - 1),
            PrimitiveKind::SignedInt => (
                -(1i128 << (self.bit_len - 1)),
                (1i128 << (self.bit_len - 1)) - 1,
            ),
            PrimitiveKind::Float => {
                let max = self.float_max() as i128;
                (-max, max)
            }
        }
    }

    /// Largest finite magnitude of a float type.
    pub fn float_max(&self) -> f64 {
        match self.bit_len {
            16 => 65_504.,
            32 => f32::MAX as f64,
            _ => f64::MAX,
        }
    }

    pub fn normalized_definition(&self) -> String {
        let cast = self.cast_mode.keyword();
        match self.kind {
            PrimitiveKind::Boolean => format!("{cast} bool"),
            PrimitiveKind::UnsignedInt => format!("{cast} uint{}", self.bit_len),
            PrimitiveKind::SignedInt => format!("{cast} int{}", self.bit_len),
            PrimitiveKind::Float => format!("{cast} float{}", self.bit_len),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArrayMode {
    /// Always exactly `max_size` elements; no length on the wire.
    Static,
    /// Up to `max_size` elements, prefixed by a length field.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    element: Box<DsdlType>,
    mode: ArrayMode,
    max_size: usize,
}

impl ArrayType {
    pub fn new(element: DsdlType, mode: ArrayMode, max_size: usize) -> Result<Self, SchemaError> {
        match element {
            DsdlType::Array(_) => return Err(SchemaError::NestedArray),
            DsdlType::Void(_) => return Err(SchemaError::VoidArrayElement),
            _ => (),
        }

        if mode == ArrayMode::Static && max_size == 0 {
            return Err(SchemaError::EmptyStaticArray);
        }

        Ok(Self {
            element: Box::new(element),
            mode,
            max_size,
        })
    }

    pub fn element(&self) -> &DsdlType {
        &self.element
    }

    pub fn mode(&self) -> ArrayMode {
        self.mode
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Width of the length prefix: `ceil(log2(max_size + 1))` for dynamic arrays.
    pub fn length_prefix_bits(&self) -> u8 {
        match self.mode {
            ArrayMode::Static => 0,
            ArrayMode::Dynamic => bits_for_count(self.max_size),
        }
    }

    /// Whether the length prefix may be dropped when this array is the last thing in the
    /// payload. Elements must be at least a byte wide, or the count can't be recovered
    /// from the payload length.
    pub fn allows_tail_optimization(&self) -> bool {
        self.mode == ArrayMode::Dynamic && self.element.min_bit_len() >= 8
    }

    pub fn min_bit_len(&self) -> usize {
        match self.mode {
            ArrayMode::Static => self.max_size * self.element.min_bit_len(),
            ArrayMode::Dynamic => self.length_prefix_bits() as usize,
        }
    }

    pub fn max_bit_len(&self) -> usize {
        self.length_prefix_bits() as usize + self.max_size * self.element.max_bit_len()
    }

    pub fn normalized_definition(&self) -> String {
        match self.mode {
            ArrayMode::Static => format!(
                "{}[{}]",
                self.element.normalized_definition(),
                self.max_size
            ),
            ArrayMode::Dynamic => format!(
                "{}[<={}]",
                self.element.normalized_definition(),
                self.max_size
            ),
        }
    }
}

/// A named slot in a composite. Void fields are unnamed.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ty: DsdlType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: DsdlType) -> Self {
        let name = if ty.is_void() {
            String::new()
        } else {
            name.into()
        };
        Self { name, ty }
    }

    /// Alignment padding.
    pub fn void(bit_len: u8) -> Result<Self, SchemaError> {
        Ok(Self::new("", DsdlType::void(bit_len)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &DsdlType {
        &self.ty
    }

    pub fn is_void(&self) -> bool {
        self.ty.is_void()
    }

    pub fn normalized_definition(&self) -> String {
        if self.is_void() {
            self.ty.normalized_definition()
        } else {
            format!("{} {}", self.ty.normalized_definition(), self.name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// A compile-time constant. Never appears on the wire, and doesn't affect the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    name: String,
    ty: PrimitiveType,
    value: ConstantValue,
}

impl Constant {
    pub fn new(
        name: impl Into<String>,
        ty: PrimitiveType,
        value: ConstantValue,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let (min, max) = ty.int_range();

        let fits = match (ty.kind(), value) {
            (PrimitiveKind::Boolean, ConstantValue::Bool(_)) => true,
            (PrimitiveKind::Float, ConstantValue::Float(v)) => {
                !v.is_finite() || v.abs() <= ty.float_max()
            }
            (_, ConstantValue::Int(v)) => (min..=max).contains(&(v as i128)),
            (_, ConstantValue::UInt(v)) => (min..=max).contains(&(v as i128)),
            _ => false,
        };

        if !fits {
            return Err(SchemaError::ConstantOutOfRange(name));
        }

        Ok(Self { name, ty, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> PrimitiveType {
        self.ty
    }

    pub fn value(&self) -> ConstantValue {
        self.value
    }
}

/// A message structure, union, or one half of a service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    full_name: String,
    fields: Vec<Field>,
    constants: Vec<Constant>,
    union: bool,
}

impl CompositeType {
    pub fn structure(full_name: impl Into<String>, fields: Vec<Field>) -> Result<Self, SchemaError> {
        Self::new(full_name.into(), fields, false)
    }

    /// Exactly one field is present per value, chosen by a tag of `ceil(log2(field count))`
    /// bits.
    pub fn union(full_name: impl Into<String>, fields: Vec<Field>) -> Result<Self, SchemaError> {
        Self::new(full_name.into(), fields, true)
    }

    fn new(full_name: String, fields: Vec<Field>, union: bool) -> Result<Self, SchemaError> {
        if union {
            if fields.len() < 2 {
                return Err(SchemaError::UnionTooSmall(full_name));
            }
            if fields.iter().any(Field::is_void) {
                return Err(SchemaError::VoidInUnion(full_name));
            }
        }

        let result = Self {
            full_name,
            fields,
            constants: Vec::new(),
            union,
        };
        result.check_names()?;

        Ok(result)
    }

    pub fn with_constants(mut self, constants: Vec<Constant>) -> Result<Self, SchemaError> {
        self.constants = constants;
        self.check_names()?;
        Ok(self)
    }

    fn check_names(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        let field_names = self
            .fields
            .iter()
            .filter(|f| !f.is_void())
            .map(Field::name);
        let constant_names = self.constants.iter().map(Constant::name);

        for name in field_names.chain(constant_names) {
            if !seen.insert(name) {
                return Err(SchemaError::DuplicateField(name.to_owned()));
            }
        }
        Ok(())
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| !f.is_void() && f.name() == name)
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name() == name)
    }

    pub fn is_union(&self) -> bool {
        self.union
    }

    pub fn union_tag_bits(&self) -> u8 {
        if self.union {
            bits_for_count(self.fields.len() - 1)
        } else {
            0
        }
    }

    pub fn min_bit_len(&self) -> usize {
        let field_lens = self.fields.iter().map(|f| f.ty().min_bit_len());
        if self.union {
            self.union_tag_bits() as usize + field_lens.min().unwrap_or(0)
        } else {
            field_lens.sum()
        }
    }

    pub fn max_bit_len(&self) -> usize {
        let field_lens = self.fields.iter().map(|f| f.ty().max_bit_len());
        if self.union {
            self.union_tag_bits() as usize + field_lens.max().unwrap_or(0)
        } else {
            field_lens.sum()
        }
    }

    fn write_signature_section(&self, txt: &mut String) {
        if self.union {
            txt.push_str("\n@union\n");
        }
        let lines: Vec<String> = self
            .fields
            .iter()
            .map(Field::normalized_definition)
            .collect();
        txt.push_str(&lines.join("\n"));
        txt.push('\n');
    }

    /// The normalized definition text the DSDL signature is computed over.
    pub fn dsdl_signature_source(&self) -> String {
        let mut txt = format!("{}\n", self.full_name);
        self.write_signature_section(&mut txt);
        normalize_signature_source(&txt)
    }

    /// Signature of this type's own definition, not counting nested types.
    pub fn dsdl_signature(&self) -> u64 {
        compute_signature(&self.dsdl_signature_source())
    }

    /// The data type signature: the DSDL signature extended with the signatures of all
    /// nested composite types, in field order.
    pub fn data_type_signature(&self) -> u64 {
        extend_signature(self.dsdl_signature(), self.fields.iter())
    }
}

fn normalize_signature_source(txt: &str) -> String {
    txt.trim()
        .replace("\n\n\n", "\n")
        .replace("\n\n", "\n")
}

fn extend_signature<'a>(dsdl_signature: u64, fields: impl Iterator<Item = &'a Field>) -> u64 {
    let mut sig = Signature::new(Some(dsdl_signature));

    for field in fields {
        if let Some(field_sig) = field.ty().data_type_signature() {
            let current = sig.value();
            sig.add(&field_sig.to_le_bytes());
            sig.add(&current.to_le_bytes());
        }
    }

    sig.value()
}

/// The closed set of DSDL wire types.
#[derive(Debug, Clone, PartialEq)]
pub enum DsdlType {
    /// Padding of the given bit length; carries no value.
    Void(u8),
    Primitive(PrimitiveType),
    Array(ArrayType),
    Composite(Arc<CompositeType>),
}

impl From<PrimitiveType> for DsdlType {
    fn from(ty: PrimitiveType) -> Self {
        Self::Primitive(ty)
    }
}

impl From<ArrayType> for DsdlType {
    fn from(ty: ArrayType) -> Self {
        Self::Array(ty)
    }
}

impl From<CompositeType> for DsdlType {
    fn from(ty: CompositeType) -> Self {
        Self::Composite(Arc::new(ty))
    }
}

impl From<Arc<CompositeType>> for DsdlType {
    fn from(ty: Arc<CompositeType>) -> Self {
        Self::Composite(ty)
    }
}

impl DsdlType {
    pub fn void(bit_len: u8) -> Result<Self, SchemaError> {
        if !(1..=64).contains(&bit_len) {
            return Err(SchemaError::InvalidBitLength {
                kind: "void",
                bit_len,
            });
        }
        Ok(Self::Void(bit_len))
    }

    pub fn boolean() -> Self {
        PrimitiveType::boolean().into()
    }

    pub fn uint(bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        Ok(PrimitiveType::uint(bit_len, cast_mode)?.into())
    }

    pub fn int(bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        Ok(PrimitiveType::int(bit_len, cast_mode)?.into())
    }

    pub fn float(bit_len: u8, cast_mode: CastMode) -> Result<Self, SchemaError> {
        Ok(PrimitiveType::float(bit_len, cast_mode)?.into())
    }

    pub fn static_array(element: DsdlType, size: usize) -> Result<Self, SchemaError> {
        Ok(ArrayType::new(element, ArrayMode::Static, size)?.into())
    }

    pub fn dynamic_array(element: DsdlType, max_size: usize) -> Result<Self, SchemaError> {
        Ok(ArrayType::new(element, ArrayMode::Dynamic, max_size)?.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void(_))
    }

    pub fn as_composite(&self) -> Option<&Arc<CompositeType>> {
        match self {
            Self::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub fn min_bit_len(&self) -> usize {
        match self {
            Self::Void(bits) => *bits as usize,
            Self::Primitive(p) => p.bit_len() as usize,
            Self::Array(a) => a.min_bit_len(),
            Self::Composite(c) => c.min_bit_len(),
        }
    }

    pub fn max_bit_len(&self) -> usize {
        match self {
            Self::Void(bits) => *bits as usize,
            Self::Primitive(p) => p.bit_len() as usize,
            Self::Array(a) => a.max_bit_len(),
            Self::Composite(c) => c.max_bit_len(),
        }
    }

    pub fn normalized_definition(&self) -> String {
        match self {
            Self::Void(bits) => format!("void{bits}"),
            Self::Primitive(p) => p.normalized_definition(),
            Self::Array(a) => a.normalized_definition(),
            Self::Composite(c) => c.full_name().to_owned(),
        }
    }

    /// Only composites (and arrays of them) carry a signature of their own.
    pub fn data_type_signature(&self) -> Option<u64> {
        match self {
            Self::Composite(c) => Some(c.data_type_signature()),
            Self::Array(a) => a.element().data_type_signature(),
            _ => None,
        }
    }
}

/// A service: a request and a response composite sharing one name and one signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceType {
    full_name: String,
    request: Arc<CompositeType>,
    response: Arc<CompositeType>,
}

impl ServiceType {
    /// The halves take on the service's full name.
    pub fn new(
        full_name: impl Into<String>,
        mut request: CompositeType,
        mut response: CompositeType,
    ) -> Self {
        let full_name = full_name.into();
        request.full_name = full_name.clone();
        response.full_name = full_name.clone();

        Self {
            full_name,
            request: Arc::new(request),
            response: Arc::new(response),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn request(&self) -> &Arc<CompositeType> {
        &self.request
    }

    pub fn response(&self) -> &Arc<CompositeType> {
        &self.response
    }

    pub fn dsdl_signature_source(&self) -> String {
        let mut txt = format!("{}\n", self.full_name);
        self.request.write_signature_section(&mut txt);
        txt.push_str("\n---\n");
        self.response.write_signature_section(&mut txt);
        normalize_signature_source(&txt)
    }

    pub fn dsdl_signature(&self) -> u64 {
        compute_signature(&self.dsdl_signature_source())
    }

    pub fn data_type_signature(&self) -> u64 {
        let fields = self.request.fields().iter().chain(self.response.fields());
        extend_signature(self.dsdl_signature(), fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint(bits: u8) -> DsdlType {
        DsdlType::uint(bits, CastMode::Saturated).unwrap()
    }

    #[test]
    fn test_primitive_bounds() {
        assert!(PrimitiveType::uint(1, CastMode::Saturated).is_err());
        assert!(PrimitiveType::uint(2, CastMode::Saturated).is_ok());
        assert!(PrimitiveType::int(64, CastMode::Truncated).is_ok());
        assert!(PrimitiveType::int(65, CastMode::Truncated).is_err());
        assert!(PrimitiveType::float(24, CastMode::Saturated).is_err());
        assert!(PrimitiveType::new(PrimitiveKind::Boolean, 2, CastMode::Saturated).is_err());
        assert!(DsdlType::void(0).is_err());
        assert!(DsdlType::void(64).is_ok());
    }

    #[test]
    fn test_int_range() {
        let i8_ = PrimitiveType::int(8, CastMode::Saturated).unwrap();
        assert_eq!(i8_.int_range(), (-128, 127));
        let u64_ = PrimitiveType::uint(64, CastMode::Saturated).unwrap();
        assert_eq!(u64_.int_range(), (0, u64::MAX as i128));
    }

    #[test]
    fn test_normalized_definitions() {
        assert_eq!(DsdlType::boolean().normalized_definition(), "saturated bool");
        assert_eq!(
            DsdlType::int(13, CastMode::Truncated)
                .unwrap()
                .normalized_definition(),
            "truncated int13"
        );
        assert_eq!(
            DsdlType::dynamic_array(uint(8), 92)
                .unwrap()
                .normalized_definition(),
            "saturated uint8[<=92]"
        );
        assert_eq!(
            Field::void(5).unwrap().normalized_definition(),
            "void5"
        );
        assert_eq!(
            Field::new("x", DsdlType::float(16, CastMode::Saturated).unwrap())
                .normalized_definition(),
            "saturated float16 x"
        );
    }

    #[test]
    fn test_array_rules() {
        let arr = DsdlType::static_array(uint(8), 4).unwrap();
        assert_eq!(
            ArrayType::new(arr, ArrayMode::Dynamic, 3),
            Err(SchemaError::NestedArray)
        );
        assert_eq!(
            ArrayType::new(uint(8), ArrayMode::Static, 0),
            Err(SchemaError::EmptyStaticArray)
        );
        assert_eq!(
            ArrayType::new(DsdlType::Void(3), ArrayMode::Static, 2),
            Err(SchemaError::VoidArrayElement)
        );
    }

    #[test]
    fn test_length_prefix_bits() {
        let prefix = |max| {
            ArrayType::new(uint(8), ArrayMode::Dynamic, max)
                .unwrap()
                .length_prefix_bits()
        };
        assert_eq!(prefix(0), 0);
        assert_eq!(prefix(1), 1);
        assert_eq!(prefix(7), 3);
        assert_eq!(prefix(92), 7);
        assert_eq!(prefix(255), 8);
        assert_eq!(prefix(256), 9);
    }

    #[test]
    fn test_tail_optimization_eligibility() {
        let bytes = ArrayType::new(uint(8), ArrayMode::Dynamic, 10).unwrap();
        assert!(bytes.allows_tail_optimization());
        let nibbles = ArrayType::new(uint(4), ArrayMode::Dynamic, 10).unwrap();
        assert!(!nibbles.allows_tail_optimization());
        let fixed = ArrayType::new(uint(8), ArrayMode::Static, 10).unwrap();
        assert!(!fixed.allows_tail_optimization());
    }

    #[test]
    fn test_bit_len_bounds() {
        let inner = CompositeType::structure(
            "test.Inner",
            vec![Field::new("a", uint(3)), Field::void(5).unwrap()],
        )
        .unwrap();
        assert_eq!(inner.min_bit_len(), 8);
        assert_eq!(inner.max_bit_len(), 8);

        let outer = CompositeType::structure(
            "test.Outer",
            vec![
                Field::new("inner", inner.into()),
                Field::new("list", DsdlType::dynamic_array(uint(16), 5).unwrap()),
            ],
        )
        .unwrap();
        assert_eq!(outer.min_bit_len(), 8 + 3);
        assert_eq!(outer.max_bit_len(), 8 + 3 + 5 * 16);
    }

    #[test]
    fn test_union_rules() {
        assert_eq!(
            CompositeType::union("test.U", vec![Field::new("a", uint(8))]),
            Err(SchemaError::UnionTooSmall("test.U".into()))
        );
        assert_eq!(
            CompositeType::union(
                "test.U",
                vec![Field::new("a", uint(8)), Field::void(3).unwrap()]
            ),
            Err(SchemaError::VoidInUnion("test.U".into()))
        );

        let u = CompositeType::union(
            "test.U",
            vec![
                Field::new("a", uint(8)),
                Field::new("b", DsdlType::int(32, CastMode::Saturated).unwrap()),
                Field::new("c", DsdlType::boolean()),
            ],
        )
        .unwrap();
        assert_eq!(u.union_tag_bits(), 2);
        assert_eq!(u.min_bit_len(), 2 + 1);
        assert_eq!(u.max_bit_len(), 2 + 32);
    }

    #[test]
    fn test_duplicate_names() {
        let dup = CompositeType::structure(
            "test.Dup",
            vec![Field::new("a", uint(8)), Field::new("a", uint(4))],
        );
        assert_eq!(dup, Err(SchemaError::DuplicateField("a".into())));

        // Voids are unnamed and never clash.
        let voids = CompositeType::structure(
            "test.Voids",
            vec![Field::void(3).unwrap(), Field::void(5).unwrap()],
        );
        assert!(voids.is_ok());

        let clash = voids.unwrap().with_constants(vec![
            Constant::new("A", PrimitiveType::uint(8, CastMode::Saturated).unwrap(), ConstantValue::UInt(1)).unwrap(),
            Constant::new("A", PrimitiveType::uint(8, CastMode::Saturated).unwrap(), ConstantValue::UInt(2)).unwrap(),
        ]);
        assert_eq!(clash, Err(SchemaError::DuplicateField("A".into())));
    }

    #[test]
    fn test_constant_range() {
        let u2 = PrimitiveType::uint(2, CastMode::Saturated).unwrap();
        assert!(Constant::new("OK", u2, ConstantValue::UInt(3)).is_ok());
        assert_eq!(
            Constant::new("BIG", u2, ConstantValue::UInt(4)),
            Err(SchemaError::ConstantOutOfRange("BIG".into()))
        );
        assert!(Constant::new("NEG", u2, ConstantValue::Int(-1)).is_err());
        assert!(Constant::new("B", PrimitiveType::boolean(), ConstantValue::UInt(1)).is_ok());
        assert!(Constant::new("F", u2, ConstantValue::Float(1.)).is_err());
    }

    #[test]
    fn test_signature_source_text() {
        let t = CompositeType::union(
            "test.Choice",
            vec![Field::new("a", uint(8)), Field::new("b", DsdlType::boolean())],
        )
        .unwrap();
        assert_eq!(
            t.dsdl_signature_source(),
            "test.Choice\n@union\nsaturated uint8 a\nsaturated bool b"
        );

        let empty = CompositeType::structure("test.Empty", vec![]).unwrap();
        let svc = ServiceType::new(
            "test.Ping",
            empty,
            CompositeType::structure("", vec![Field::new("ok", DsdlType::boolean())]).unwrap(),
        );
        assert_eq!(svc.dsdl_signature_source(), "test.Ping\n---\nsaturated bool ok");
        assert_eq!(svc.request().full_name(), "test.Ping");
    }

    #[test]
    fn test_nested_signature_changes_parent() {
        let inner_a = CompositeType::structure("test.Inner", vec![Field::new("x", uint(8))]).unwrap();
        let inner_b = CompositeType::structure("test.Inner", vec![Field::new("x", uint(16))]).unwrap();

        let outer = |inner: CompositeType| {
            CompositeType::structure("test.Outer", vec![Field::new("inner", inner.into())])
                .unwrap()
        };

        let a = outer(inner_a);
        let b = outer(inner_b);
        // Same text, different nested layout.
        assert_eq!(a.dsdl_signature(), b.dsdl_signature());
        assert_ne!(a.data_type_signature(), b.data_type_signature());
    }
}
