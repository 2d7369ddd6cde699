use std::fmt;

/// A source-level type.
///
/// Types are plain immutable values and are always compared structurally,
/// never by identity: `*int` is not `int`, `int[3]` is not `int[4]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Char,
    Void,
    Pointer(Box<Type>),
    Array(Box<Type>, u32),
}

impl Type {
    /// Wraps `base` in `pointers` levels of indirection.
    pub fn build(base: Type, pointers: usize) -> Type {
        (0..pointers).fold(base, |ty, _| Type::Pointer(Box::new(ty)))
    }

    pub fn pointer_to(ty: Type) -> Type {
        Type::Pointer(Box::new(ty))
    }

    pub fn array_of(ty: Type, size: u32) -> Type {
        Type::Array(Box::new(ty), size)
    }

    /// The type directly wrapped by a pointer or an array.
    pub fn wrapped(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) | Type::Array(inner, _) => Some(inner),
            _ => None,
        }
    }

    /// The innermost non-composite type.
    pub fn base(&self) -> &Type {
        let mut curr = self;
        while let Some(inner) = curr.wrapped() {
            curr = inner;
        }
        curr
    }

    pub fn is_indexable(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Array(..))
    }

    /// Whether values of this type are plain integers at the machine level.
    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Int | Type::Char)
    }

    /// Number of bytes of linear memory backing a value declared with this
    /// type. Array elements are one byte wide.
    pub fn byte_len(&self) -> u32 {
        match self {
            Type::Array(inner, size) => match **inner {
                Type::Array(..) => inner.byte_len().saturating_mul(*size),
                _ => *size,
            },
            _ => 4,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Char => f.write_str("char"),
            Type::Void => f.write_str("void"),
            Type::Pointer(inner) => write!(f, "*{inner}"),
            Type::Array(inner, size) => write!(f, "{inner}[{size}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::build(Type::Char, 2).to_string(), "**char");
        assert_eq!(Type::array_of(Type::Int, 10).to_string(), "int[10]");
        assert_eq!(
            Type::array_of(Type::array_of(Type::Int, 3), 2).to_string(),
            "int[3][2]"
        );
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Type::pointer_to(Type::Int), Type::build(Type::Int, 1));
        assert_ne!(Type::pointer_to(Type::Int), Type::Int);
        assert_ne!(Type::array_of(Type::Int, 3), Type::array_of(Type::Int, 4));
        assert_ne!(Type::array_of(Type::Char, 3), Type::pointer_to(Type::Char));
    }

    #[test]
    fn base_and_wrapped() {
        let ty = Type::pointer_to(Type::array_of(Type::Float, 4));
        assert_eq!(ty.wrapped(), Some(&Type::array_of(Type::Float, 4)));
        assert_eq!(ty.base(), &Type::Float);
        assert_eq!(Type::Int.wrapped(), None);
        assert_eq!(Type::Int.base(), &Type::Int);
    }

    #[test]
    fn byte_len() {
        assert_eq!(Type::Int.byte_len(), 4);
        assert_eq!(Type::array_of(Type::Char, 25).byte_len(), 25);
        assert_eq!(
            Type::array_of(Type::array_of(Type::Int, 3), 2).byte_len(),
            6
        );
    }
}
