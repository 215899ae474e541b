use nnvm::ir::ConnectorId;
use nnvm::schedule::BufferAllocation;
use serde::{Deserialize, Serialize};

use crate::decode::SectionReader;
use crate::error::DecodeError;
use crate::writer::SectionWriter;

/// Module type stamped into every container built by this crate.
pub const STACKVM_MODULE_TYPE: &str = "stackvm";
pub const MODULE_MAGIC: [u8; 4] = *b"NNVM";
pub const MODULE_VERSION: u32 = 1;
const MODULE_TYPE_LEN: usize = 16;

pub const TEXT_SECTION: &str = ".text";
pub const RDATA_SECTION: &str = ".rdata";
pub const MANIFEST_SECTION: &str = ".manifest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub body: Vec<u8>,
}

/// Graph boundary entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestBinding {
    pub name: String,
    pub connector: ConnectorId,
    pub allocation: BufferAllocation,
}

/// JSON body of `.manifest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    /// Bytes per memory location, indexed by location tag.
    pub pool_sizes: [usize; 4],
    pub inputs: Vec<ManifestBinding>,
    pub outputs: Vec<ManifestBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackvmModule {
    pub name: String,
    pub module_type: String,
    pub sections: Vec<Section>,
}

impl StackvmModule {
    pub fn section(&self, name: &str) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|section| section.name == name)
            .map(|section| section.body.as_slice())
    }

    pub fn text(&self) -> &[u8] {
        self.section(TEXT_SECTION).unwrap_or_default()
    }

    pub fn rdata(&self) -> &[u8] {
        self.section(RDATA_SECTION).unwrap_or_default()
    }

    pub fn manifest(&self) -> Result<Manifest, DecodeError> {
        let body = self
            .section(MANIFEST_SECTION)
            .ok_or_else(|| DecodeError::Container(format!("missing {MANIFEST_SECTION} section")))?;
        serde_json::from_slice(body).map_err(|err| DecodeError::Container(err.to_string()))
    }

    /// Container bytes: magic, version, padded module type, then each
    /// section as a length-prefixed name and a length-prefixed body.
    pub fn serialize(&self) -> Result<Vec<u8>, DecodeError> {
        let mut writer = SectionWriter::new();
        writer.write_bytes(&MODULE_MAGIC);
        writer.write_u32(MODULE_VERSION);

        let module_type = self.module_type.as_bytes();
        if module_type.len() > MODULE_TYPE_LEN {
            return Err(DecodeError::Container(format!(
                "module type `{}` exceeds {MODULE_TYPE_LEN} bytes",
                self.module_type
            )));
        }
        let mut padded = [0u8; MODULE_TYPE_LEN];
        padded[..module_type.len()].copy_from_slice(module_type);
        writer.write_bytes(&padded);

        let count = u32::try_from(self.sections.len())
            .map_err(|_| DecodeError::Container("too many sections".to_string()))?;
        writer.write_u32(count);
        for section in &self.sections {
            let name = u8::try_from(section.name.len())
                .map_err(|_| DecodeError::Container(format!("section name `{}` too long", section.name)))?;
            let len = u32::try_from(section.body.len())
                .map_err(|_| DecodeError::Container(format!("section `{}` too large", section.name)))?;
            writer.write_u8(name);
            writer.write_bytes(section.name.as_bytes());
            writer.write_u32(len);
            writer.write_bytes(&section.body);
        }
        Ok(writer.finish())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = SectionReader::new(bytes);
        if reader.read_bytes(MODULE_MAGIC.len())? != MODULE_MAGIC {
            return Err(DecodeError::Container("bad magic".to_string()));
        }
        let version = reader.read_u32()?;
        if version != MODULE_VERSION {
            return Err(DecodeError::Container(format!("unsupported version {version}")));
        }
        let padded = reader.read_bytes(MODULE_TYPE_LEN)?;
        let end = padded.iter().position(|byte| *byte == 0).unwrap_or(MODULE_TYPE_LEN);
        let module_type = utf8(&padded[..end])?;

        let count = reader.read_u32()?;
        let mut sections = Vec::new();
        for _ in 0..count {
            let name_len = reader.read_u8()? as usize;
            let name = utf8(reader.read_bytes(name_len)?)?;
            let body_len = reader.read_u32()? as usize;
            let body = reader.read_bytes(body_len)?.to_vec();
            sections.push(Section { name, body });
        }
        if !reader.is_empty() {
            return Err(DecodeError::Container(format!(
                "trailing bytes after byte {}",
                reader.position()
            )));
        }

        let name = match sections.iter().find(|section| section.name == MANIFEST_SECTION) {
            Some(section) => serde_json::from_slice::<Manifest>(&section.body)
                .map_err(|err| DecodeError::Container(err.to_string()))?
                .name,
            None => String::new(),
        };
        Ok(Self {
            name,
            module_type,
            sections,
        })
    }
}

fn utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|err| DecodeError::Container(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> StackvmModule {
        let manifest = Manifest {
            name: "tiny".to_string(),
            pool_sizes: [4, 4, 0, 0],
            ..Manifest::default()
        };
        StackvmModule {
            name: "tiny".to_string(),
            module_type: STACKVM_MODULE_TYPE.to_string(),
            sections: vec![
                Section {
                    name: TEXT_SECTION.to_string(),
                    body: vec![0x00],
                },
                Section {
                    name: MANIFEST_SECTION.to_string(),
                    body: serde_json::to_vec(&manifest).expect("manifest"),
                },
            ],
        }
    }

    #[test]
    fn container_layout() {
        let bytes = module().serialize().expect("serialize");
        assert_eq!(&bytes[..4], b"NNVM");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), MODULE_VERSION);
        assert_eq!(&bytes[8..15], b"stackvm");
        assert!(bytes[15..24].iter().all(|byte| *byte == 0));
        assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 2);
        assert_eq!(bytes[28] as usize, TEXT_SECTION.len());
        assert_eq!(&bytes[29..34], b".text");
        assert_eq!(&bytes[34..38], &1u32.to_le_bytes());
        assert_eq!(bytes[38], 0x00);
    }

    #[test]
    fn deserialize_restores_sections_and_name() {
        let original = module();
        let restored = StackvmModule::deserialize(&original.serialize().expect("serialize")).expect("deserialize");
        assert_eq!(restored, original);
        assert_eq!(restored.manifest().expect("manifest").pool_sizes, [4, 4, 0, 0]);
    }

    #[test]
    fn deserialize_rejects_garbage() {
        let mut bytes = module().serialize().expect("serialize");
        bytes.push(0);
        assert!(matches!(StackvmModule::deserialize(&bytes), Err(DecodeError::Container(_))));
        assert!(matches!(StackvmModule::deserialize(b"NOPE"), Err(DecodeError::Container(_))));
    }
}
