//! Seedable generator of arbitrary, signature-conformant values.
//!
//! Every draw works against a node budget. Composite signatures (lists,
//! structs, dynamic payloads) each consume one unit; once the budget is
//! spent or the depth cap is reached only terminal signatures are drawn and
//! lists come out empty, so generation always terminates.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::capability::CapabilityMap;
use crate::name::sanitize_name;
use crate::object::{MetaMember, MetaMethod, MetaObject, ObjectReference};
use crate::signature::{Signature, StructSignature, MAX_DEPTH};
use crate::value::{Field, ListValue, StructValue, Value};

/// Characters used for random strings: ASCII, punctuation and multibyte text.
const STRING_ALPHABET: &[char] = &[
    'a', 'b', 'z', 'A', 'Q', 'Z', '0', '7', '9', ' ', '_', '-', '.', ',', '<', '>', '(', ')',
    '[', ']', '\0', '\n', 'é', 'ß', 'Ω', 'ж', 'ع', 'א', 'ह', '日', '本', '한', 'ก', '€', '😀',
];

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Attempts at sanitizing a random candidate before falling back to letters.
const NAME_ATTEMPTS: usize = 8;

/// Probability of picking a boundary value instead of a uniform one.
const BOUNDARY_PROBABILITY: f64 = 0.3;

/// Size limits for generated values.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Composite nodes per generated value. Default: 64.
    pub budget: usize,
    /// Maximum nesting of lists, structs and dynamic values. Default: 6.
    /// Values above the decoder limit ([`MAX_DEPTH`]) are clamped to it.
    pub max_depth: usize,
    /// Maximum list length and struct field count. Default: 6.
    pub max_elements: usize,
    /// Maximum length of generated names and strings. Default: 24.
    pub max_name_len: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            budget: 64,
            max_depth: 6,
            max_elements: 6,
            max_name_len: 24,
        }
    }
}

/// Random value generator over any [`Rng`].
#[derive(Debug)]
pub struct ValueGenerator<R> {
    rng: R,
    config: GeneratorConfig,
    budget: usize,
}

impl ValueGenerator<StdRng> {
    /// Deterministic generator: the same seed yields the same values.
    pub fn from_seed(seed: u64, config: GeneratorConfig) -> Self {
        Self::new(StdRng::seed_from_u64(seed), config)
    }
}

impl<R: Rng> ValueGenerator<R> {
    pub fn new(rng: R, config: GeneratorConfig) -> Self {
        let budget = config.budget;
        Self {
            rng,
            config,
            budget,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Draw a random signature.
    pub fn signature(&mut self) -> Signature {
        self.budget = self.config.budget;
        self.draw_signature(0)
    }

    /// Draw a random signature and a value conforming to it.
    pub fn value(&mut self) -> (Signature, Value) {
        self.budget = self.config.budget;
        let signature = self.draw_signature(0);
        let value = self.fill(&signature, 0);
        (signature, value)
    }

    /// Draw a value conforming to `signature`.
    pub fn value_of(&mut self, signature: &Signature) -> Value {
        self.budget = self.config.budget;
        self.fill(signature, 0)
    }

    /// Draw a valid identifier.
    ///
    /// Random text is sanitized; when nothing survives, a fresh candidate is
    /// drawn instead, and after a few misses the name is built from letters.
    pub fn name(&mut self) -> String {
        let max_len = self.config.max_name_len.max(1);
        for _ in 0..NAME_ATTEMPTS {
            let candidate = self.string(max_len);
            if let Some(name) = sanitize_name(&candidate) {
                return name;
            }
        }
        let len = self.rng.random_range(1..=max_len);
        (0..len)
            .map(|_| LETTERS[self.rng.random_range(0..LETTERS.len())] as char)
            .collect()
    }

    /// Random map holding random credentials and random extra entries.
    pub fn capability_map(&mut self) -> CapabilityMap {
        let max_len = self.config.max_name_len;
        let user = self.string(max_len);
        let token = self.string(max_len);
        let mut map = CapabilityMap::with_credentials(user, token);
        let extra = self.rng.random_range(0..=self.config.max_elements);
        for _ in 0..extra {
            let key = self.string(max_len);
            if map.contains_key(&key) {
                continue;
            }
            let (_, value) = self.value();
            map.insert(key, value);
        }
        map
    }

    fn take_budget(&mut self, depth: usize) -> bool {
        if self.budget == 0 || depth >= self.config.max_depth.min(MAX_DEPTH) {
            return false;
        }
        self.budget -= 1;
        true
    }

    fn terminal_signature(&mut self) -> Signature {
        let index = self.rng.random_range(0..Signature::SCALARS.len());
        Signature::SCALARS[index].clone()
    }

    fn draw_signature(&mut self, depth: usize) -> Signature {
        if !self.take_budget(depth) {
            return self.terminal_signature();
        }
        match self.rng.random_range(0..16) {
            0..=11 => self.terminal_signature(),
            12 => Signature::Dynamic,
            13 => Signature::Object,
            14 => Signature::List(Box::new(self.draw_signature(depth + 1))),
            _ => {
                let count = self.rng.random_range(0..=self.config.max_elements);
                let name = self.name();
                let fields = (0..count)
                    .map(|_| {
                        let field = self.name();
                        (field, self.draw_signature(depth + 1))
                    })
                    .collect();
                Signature::Struct(StructSignature { name, fields })
            }
        }
    }

    fn fill(&mut self, signature: &Signature, depth: usize) -> Value {
        match signature {
            Signature::Bool => Value::Bool(self.rng.random()),
            Signature::Int8 => Value::Int8(self.pick(&[i8::MIN, i8::MAX, 0, -1])),
            Signature::Uint8 => Value::Uint8(self.pick(&[u8::MIN, u8::MAX])),
            Signature::Int16 => Value::Int16(self.pick(&[i16::MIN, i16::MAX, 0, -1])),
            Signature::Uint16 => Value::Uint16(self.pick(&[u16::MIN, u16::MAX])),
            Signature::Int32 => Value::Int32(self.pick(&[i32::MIN, i32::MAX, 0, -1])),
            Signature::Uint32 => Value::Uint32(self.pick(&[u32::MIN, u32::MAX])),
            Signature::Int64 => Value::Int64(self.pick(&[i64::MIN, i64::MAX, 0, -1, 42 << 42])),
            Signature::Uint64 => Value::Uint64(self.pick(&[u64::MIN, u64::MAX])),
            Signature::Float32 => Value::Float32(self.pick(&[
                0.0,
                -0.0,
                -1.234,
                f32::MIN,
                f32::MAX,
                f32::MIN_POSITIVE,
                f32::INFINITY,
                f32::NAN,
            ])),
            Signature::String => {
                let text = if self.rng.random_bool(BOUNDARY_PROBABILITY) {
                    String::new()
                } else {
                    self.string(self.config.max_name_len)
                };
                Value::String(text)
            }
            Signature::Void => Value::Void,
            Signature::Dynamic => {
                let inner = if self.take_budget(depth) {
                    self.draw_signature(depth + 1)
                } else {
                    self.terminal_signature()
                };
                let value = self.fill(&inner, depth + 1);
                Value::dynamic(&value)
            }
            Signature::Object => Value::Object(self.object(depth)),
            Signature::List(element) => {
                let count = if self.take_budget(depth) && !self.rng.random_bool(BOUNDARY_PROBABILITY) {
                    self.rng.random_range(1..=self.config.max_elements.max(1))
                } else {
                    0
                };
                let items = (0..count).map(|_| self.fill(element, depth + 1)).collect();
                Value::List(ListValue::from_parts((**element).clone(), items))
            }
            Signature::Struct(shape) => {
                let fields = shape
                    .fields
                    .iter()
                    .map(|(name, field)| Field {
                        name: name.clone(),
                        value: self.fill(field, depth + 1),
                    })
                    .collect();
                Value::Struct(StructValue::from_parts(shape.name.clone(), fields))
            }
        }
    }

    fn object(&mut self, depth: usize) -> ObjectReference {
        let meta_object = if self.take_budget(depth) && self.rng.random_bool(0.5) {
            Some(self.meta_object())
        } else {
            None
        };
        ObjectReference {
            meta_object,
            service_id: self.pick(&[0, 1, u32::MAX]),
            object_id: self.pick(&[0, 1, u32::MAX]),
        }
    }

    fn meta_object(&mut self) -> MetaObject {
        let methods = (0..self.rng.random_range(0..=2))
            .map(|_| MetaMethod {
                uid: self.rng.random(),
                return_signature: self.terminal_signature().to_string(),
                name: self.name(),
                parameters_signature: format!("({})", self.terminal_signature()),
                description: self.string(self.config.max_name_len),
            })
            .collect();
        let signals = self.members();
        let properties = self.members();
        MetaObject {
            methods,
            signals,
            properties,
            description: self.string(self.config.max_name_len),
        }
    }

    fn members(&mut self) -> Vec<MetaMember> {
        (0..self.rng.random_range(0..=2))
            .map(|_| MetaMember {
                uid: self.rng.random(),
                name: self.name(),
                signature: self.terminal_signature().to_string(),
            })
            .collect()
    }

    /// A boundary value from `edges`, or a uniformly random one.
    fn pick<T>(&mut self, edges: &[T]) -> T
    where
        T: Copy,
        rand::distr::StandardUniform: rand::distr::Distribution<T>,
    {
        if !edges.is_empty() && self.rng.random_bool(BOUNDARY_PROBABILITY) {
            edges[self.rng.random_range(0..edges.len())]
        } else {
            self.rng.random()
        }
    }

    fn string(&mut self, max_len: usize) -> String {
        let len = self.rng.random_range(0..=max_len);
        (0..len)
            .map(|_| STRING_ALPHABET[self.rng.random_range(0..STRING_ALPHABET.len())])
            .collect()
    }
}
