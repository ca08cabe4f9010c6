use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const LEAF: u16 = 0;
const CHILDREN: u16 = 1;

/// Counts and indices are stored as `u16`, larger values cannot be written.
pub fn to_u16(value: usize, what: &str) -> std::io::Result<u16> {
	u16::try_from(value).map_err(|_| std::io::Error::new(
		std::io::ErrorKind::InvalidInput,
		format!("{} {} does not fit the model format (max {})", what, value, u16::MAX),
	))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
	pub value: f64,
	pub column: usize,
}

impl Split {
	pub fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
		writer.write_f64::<BigEndian>(self.value)?;
		writer.write_u16::<BigEndian>(to_u16(self.column, "split column")?)?;

		Ok(())
	}

	pub fn deserialize<R: Read>(reader: &mut R) -> std::io::Result<Self> {
		let value = reader.read_f64::<BigEndian>()?;
		let column = reader.read_u16::<BigEndian>()? as usize;

		Ok(Self { value, column })
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	/// Normalized class distribution of the training rows that ended here.
	Leaf(Vec<f64>),
	Children {
		left: Box<Node>,
		right: Box<Node>,
		split: Split,
	},
}

impl Node {
	pub fn predict_proba(&self, x: &[f64]) -> &[f64] {
		match &self {
			Node::Leaf(distribution) => distribution.as_slice(),
			Node::Children { left, right, split } => {
				if x[split.column] < split.value {
					left.predict_proba(x)
				} else {
					right.predict_proba(x)
				}
			},
		}
	}

	pub fn depth(&self) -> usize {
		match &self {
			Node::Leaf(_) => 0,
			Node::Children { left, right, .. } => 1 + std::cmp::max(left.depth(), right.depth()),
		}
	}

	/// Checks leaf widths and split columns against the model header.
	pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
		match &self {
			Node::Leaf(distribution) if distribution.len() != n_classes => Err(format!(
				"leaf has {} classes, expected {}",
				distribution.len(),
				n_classes
			)),
			Node::Leaf(_) => Ok(()),
			Node::Children { split, .. } if split.column >= n_features => Err(format!(
				"split on column {} but model has {} features",
				split.column,
				n_features
			)),
			Node::Children { left, right, .. } => {
				left.validate(n_features, n_classes)?;
				right.validate(n_features, n_classes)
			},
		}
	}

	pub fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
		match &self {
			Node::Leaf(distribution) => {
				writer.write_u16::<BigEndian>(LEAF)?;
				writer.write_u16::<BigEndian>(to_u16(distribution.len(), "leaf width")?)?;
				for &p in distribution {
					writer.write_f64::<BigEndian>(p)?;
				}
			},
			Node::Children { left, right, split } => {
				writer.write_u16::<BigEndian>(CHILDREN)?;
				split.serialize(writer)?;
				left.serialize(writer)?;
				right.serialize(writer)?;
			}
		}

		Ok(())
	}

	pub fn deserialize<R: Read>(reader: &mut R) -> std::io::Result<Self> {
		match reader.read_u16::<BigEndian>()? {
			LEAF => {
				let len = reader.read_u16::<BigEndian>()?;
				let distribution = (0..len)
					.map(|_| reader.read_f64::<BigEndian>())
					.collect::<std::io::Result<Vec<f64>>>()?;

				Ok(Node::Leaf(distribution))
			},
			CHILDREN => {
				let split = Split::deserialize(reader)?;
				let left = Box::new(Node::deserialize(reader)?);
				let right = Box::new(Node::deserialize(reader)?);

				Ok(Node::Children { split, left, right })
			},
			i => Err(std::io::Error::new(
				std::io::ErrorKind::InvalidData,
				format!("unknown tree type {:?}", i),
			)),
		}
	}
}
