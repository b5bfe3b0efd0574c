use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Primitive scalar kinds understood by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeName {
    Boolean,
    Int,
    BigInt,
    Float,
    Double,
    String,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// A duration in milliseconds.
    Timespan,
}

impl TypeName {
    /// Every primitive kind, in declaration order.
    pub const ALL: [TypeName; 8] = [
        TypeName::Boolean,
        TypeName::Int,
        TypeName::BigInt,
        TypeName::Float,
        TypeName::Double,
        TypeName::String,
        TypeName::Timestamp,
        TypeName::Timespan,
    ];

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeName::Int | TypeName::BigInt | TypeName::Float | TypeName::Double
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(self, TypeName::Int | TypeName::BigInt)
    }

    /// Parse a type name as written in column declarations (`int`, `bigint`, ...).
    pub fn from_sql(name: &str) -> Option<Self> {
        let parsed = match name.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => TypeName::Boolean,
            "int" | "integer" => TypeName::Int,
            "bigint" | "long" => TypeName::BigInt,
            "float" => TypeName::Float,
            "double" => TypeName::Double,
            "string" | "text" | "varchar" => TypeName::String,
            "timestamp" => TypeName::Timestamp,
            "timespan" | "interval" => TypeName::Timespan,
            _ => return None,
        };
        Some(parsed)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeName::Boolean => "BOOLEAN",
            TypeName::Int => "INT",
            TypeName::BigInt => "BIGINT",
            TypeName::Float => "FLOAT",
            TypeName::Double => "DOUBLE",
            TypeName::String => "STRING",
            TypeName::Timestamp => "TIMESTAMP",
            TypeName::Timespan => "TIMESPAN",
        };
        f.write_str(s)
    }
}

/// A family of types a universal type variable may be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeClass {
    /// Every type, including structured ones.
    Any,
    /// INT, BIGINT, FLOAT, DOUBLE.
    Numeric,
    /// Every scalar type.
    Comparable,
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeClass::Any => "TYPECLASS_ANY",
            TypeClass::Numeric => "TYPECLASS_NUMERIC",
            TypeClass::Comparable => "TYPECLASS_COMPARABLE",
        };
        f.write_str(s)
    }
}

/// One requirement placed on a [`UniversalType`].
///
/// `nullable: true` admits both nullable and non-null members of the class;
/// `nullable: false` admits only non-null members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub class: TypeClass,
    pub nullable: bool,
}

impl Constraint {
    pub fn new(class: TypeClass, nullable: bool) -> Self {
        Self { class, nullable }
    }

    /// "any nullable type"
    pub fn any_nullable() -> Self {
        Self::new(TypeClass::Any, true)
    }

    pub fn is_satisfied_by(&self, ty: &Type) -> bool {
        if ty.is_nullable() && !self.nullable {
            return false;
        }
        match self.class {
            TypeClass::Any => !matches!(ty, Type::Universal(_)),
            TypeClass::Numeric => ty.primitive_name().is_some_and(TypeName::is_numeric),
            TypeClass::Comparable => ty.primitive_name().is_some(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{} NULL", self.class)
        } else {
            write!(f, "{} NOT NULL", self.class)
        }
    }
}

/// A named type variable (`'a`) that unifies with any type meeting all of
/// its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniversalType {
    alias: String,
    constraints: Vec<Constraint>,
}

impl UniversalType {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Check `actual` against every constraint, returning it as the binding
    /// for this variable.
    pub fn unify(&self, actual: &Type) -> Result<Type, TypeError> {
        match self
            .constraints
            .iter()
            .find(|c| !c.is_satisfied_by(actual))
        {
            Some(violated) => Err(TypeError::ConstraintViolation {
                alias: self.alias.clone(),
                constraint: *violated,
                actual: actual.clone(),
            }),
            None => Ok(actual.clone()),
        }
    }
}

impl fmt::Display for UniversalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias)?;
        for (i, c) in self.constraints.iter().enumerate() {
            let sep = if i == 0 { " : " } else { ", " };
            write!(f, "{sep}{c}")?;
        }
        Ok(())
    }
}

/// A field, argument or result type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Non-null scalar.
    Primitive(TypeName),
    /// Scalar that may also be null.
    Nullable(TypeName),
    /// Structured list type; never produced by the delimited parser.
    List(Box<Type>),
    /// Type variable, resolved at plan time.
    Universal(UniversalType),
}

impl Type {
    pub fn primitive(name: TypeName) -> Self {
        Type::Primitive(name)
    }

    pub fn nullable(name: TypeName) -> Self {
        Type::Nullable(name)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// The scalar kind behind a primitive or nullable type.
    pub fn primitive_name(&self) -> Option<TypeName> {
        match self {
            Type::Primitive(name) | Type::Nullable(name) => Some(*name),
            Type::List(_) | Type::Universal(_) => None,
        }
    }

    /// The nullable form of this type. Non-scalar types are returned as-is.
    pub fn as_nullable(&self) -> Type {
        match self {
            Type::Primitive(name) => Type::Nullable(*name),
            other => other.clone(),
        }
    }

    /// Whether a value of type `other` may be stored where `self` is expected.
    ///
    /// A non-null type is accepted wherever its nullable form is expected.
    pub fn accepts(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Nullable(a), Type::Primitive(b) | Type::Nullable(b)) => a == b,
            (Type::Primitive(a), Type::Primitive(b)) => a == b,
            (Type::List(a), Type::List(b)) => a.accepts(b),
            (Type::Universal(u), actual) => u.unify(actual).is_ok(),
            _ => false,
        }
    }

    /// Replace every universal variable named `alias` with `binding`.
    pub fn substitute(&self, alias: &str, binding: &Type) -> Type {
        match self {
            Type::Universal(u) if u.alias() == alias => binding.clone(),
            Type::List(inner) => Type::List(Box::new(inner.substitute(alias, binding))),
            other => other.clone(),
        }
    }

    /// Parse a column declaration type: `int`, `string?` (nullable), ...
    pub fn from_sql(decl: &str) -> Option<Self> {
        let decl = decl.trim();
        match decl.strip_suffix('?') {
            Some(base) => TypeName::from_sql(base).map(Type::Nullable),
            None => TypeName::from_sql(decl).map(Type::Primitive),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(name) => write!(f, "{name} NOT NULL"),
            Type::Nullable(name) => write!(f, "{name}"),
            Type::List(inner) => write!(f, "LIST<{inner}>"),
            Type::Universal(u) => write!(f, "{u}"),
        }
    }
}
