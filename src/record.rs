//! Member record model
//!
//! A member record is a flat set of named fields. Every field is present at
//! all times; a field the server did not send (or sent as `null`) reads as an
//! empty string.

use crate::format::{
    self, canonical_string, to_canonical_date, DateConvention,
};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifiers of every member record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberField {
    Id,
    Nome,
    Sexo,
    Nascimento,
    Naturalidade,
    EstadoCivil,
    NomeConjuge,
    DataCasamento,
    Rg,
    Escolaridade,
    Profissao,
    NomePai,
    NomeMae,
    Telefone,
    Celular,
    Email,
    Endereco,
    Complemento,
    Bairro,
    Cidade,
    Pais,
    Cep,
    TipoMembro,
    Oficio,
    BatismoData,
    BatismoPastor,
    BatismoIgreja,
    ProfissaoFeData,
    ProfissaoFePastor,
    ProfissaoFeIgreja,
}

/// Options offered for `sexo`.
pub const SEXO_OPTIONS: &[&str] = &["Feminino", "Masculino"];

/// Options offered for `estado_civil`.
pub const ESTADO_CIVIL_OPTIONS: &[&str] =
    &["Solteiro", "Casado", "Divorciado", "Separado", "Viúvo", "União Estável"];

/// Options offered for `escolaridade`.
pub const ESCOLARIDADE_OPTIONS: &[&str] = &[
    "Ensino Fundamental Incompleto",
    "Ensino Fundamental Completo",
    "Ensino Médio Incompleto",
    "Ensino Médio Completo",
    "Superior Incompleto",
    "Superior Completo",
    "Pós-Graduação",
    "Mestrado",
    "Doutorado",
    "Outro",
];

/// Options offered for `tipo_membro`.
pub const TIPO_MEMBRO_OPTIONS: &[&str] = &["Membro Comungante", "Não Comungante", "Não Membro"];

/// Options offered for `oficio`.
pub const OFICIO_OPTIONS: &[&str] = &["Não Oficial", "Diácono", "Presbítero"];

/// How a field's value is entered and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Phone,
    PostalCode,
    Date,
    Choice(&'static [&'static str]),
}

/// Form section a field is shown under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldSection {
    Internal,
    Personal,
    Contact,
    Address,
    Ecclesiastical,
    Baptism,
    ProfessionOfFaith,
}

impl FieldSection {
    /// Heading shown above the section.
    pub fn title(&self) -> &'static str {
        match self {
            FieldSection::Internal => "Interno",
            FieldSection::Personal => "Dados Pessoais",
            FieldSection::Contact => "Contato",
            FieldSection::Address => "Endereço",
            FieldSection::Ecclesiastical => "Dados Eclesiásticos",
            FieldSection::Baptism => "Batismo",
            FieldSection::ProfessionOfFaith => "Profissão de Fé",
        }
    }
}

impl MemberField {
    /// Every field, in form order.
    pub const ALL: [MemberField; 30] = [
        MemberField::Id,
        MemberField::Nome,
        MemberField::Sexo,
        MemberField::Nascimento,
        MemberField::Naturalidade,
        MemberField::EstadoCivil,
        MemberField::NomeConjuge,
        MemberField::DataCasamento,
        MemberField::Rg,
        MemberField::Escolaridade,
        MemberField::Profissao,
        MemberField::NomePai,
        MemberField::NomeMae,
        MemberField::Telefone,
        MemberField::Celular,
        MemberField::Email,
        MemberField::Endereco,
        MemberField::Complemento,
        MemberField::Bairro,
        MemberField::Cidade,
        MemberField::Pais,
        MemberField::Cep,
        MemberField::TipoMembro,
        MemberField::Oficio,
        MemberField::BatismoData,
        MemberField::BatismoPastor,
        MemberField::BatismoIgreja,
        MemberField::ProfissaoFeData,
        MemberField::ProfissaoFePastor,
        MemberField::ProfissaoFeIgreja,
    ];

    /// Wire name of the field
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberField::Id => "id",
            MemberField::Nome => "nome",
            MemberField::Sexo => "sexo",
            MemberField::Nascimento => "nascimento",
            MemberField::Naturalidade => "naturalidade",
            MemberField::EstadoCivil => "estado_civil",
            MemberField::NomeConjuge => "nome_conjuge",
            MemberField::DataCasamento => "data_casamento",
            MemberField::Rg => "rg",
            MemberField::Escolaridade => "escolaridade",
            MemberField::Profissao => "profissao",
            MemberField::NomePai => "nome_pai",
            MemberField::NomeMae => "nome_mae",
            MemberField::Telefone => "telefone",
            MemberField::Celular => "celular",
            MemberField::Email => "email",
            MemberField::Endereco => "endereco",
            MemberField::Complemento => "complemento",
            MemberField::Bairro => "bairro",
            MemberField::Cidade => "cidade",
            MemberField::Pais => "pais",
            MemberField::Cep => "cep",
            MemberField::TipoMembro => "tipo_membro",
            MemberField::Oficio => "oficio",
            MemberField::BatismoData => "batismo_data",
            MemberField::BatismoPastor => "batismo_pastor",
            MemberField::BatismoIgreja => "batismo_igreja",
            MemberField::ProfissaoFeData => "profissao_fe_data",
            MemberField::ProfissaoFePastor => "profissao_fe_pastor",
            MemberField::ProfissaoFeIgreja => "profissao_fe_igreja",
        }
    }

    /// Look a field up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            MemberField::Telefone | MemberField::Celular => FieldKind::Phone,
            MemberField::Cep => FieldKind::PostalCode,
            MemberField::Nascimento
            | MemberField::DataCasamento
            | MemberField::BatismoData
            | MemberField::ProfissaoFeData => FieldKind::Date,
            MemberField::Sexo => FieldKind::Choice(SEXO_OPTIONS),
            MemberField::EstadoCivil => FieldKind::Choice(ESTADO_CIVIL_OPTIONS),
            MemberField::Escolaridade => FieldKind::Choice(ESCOLARIDADE_OPTIONS),
            MemberField::TipoMembro => FieldKind::Choice(TIPO_MEMBRO_OPTIONS),
            MemberField::Oficio => FieldKind::Choice(OFICIO_OPTIONS),
            _ => FieldKind::Text,
        }
    }

    pub fn section(&self) -> FieldSection {
        match self {
            MemberField::Id => FieldSection::Internal,
            MemberField::Telefone | MemberField::Celular | MemberField::Email => {
                FieldSection::Contact
            }
            MemberField::Endereco
            | MemberField::Complemento
            | MemberField::Bairro
            | MemberField::Cidade
            | MemberField::Pais
            | MemberField::Cep => FieldSection::Address,
            MemberField::TipoMembro | MemberField::Oficio => FieldSection::Ecclesiastical,
            MemberField::BatismoData | MemberField::BatismoPastor | MemberField::BatismoIgreja => {
                FieldSection::Baptism
            }
            MemberField::ProfissaoFeData
            | MemberField::ProfissaoFePastor
            | MemberField::ProfissaoFeIgreja => FieldSection::ProfessionOfFaith,
            _ => FieldSection::Personal,
        }
    }

    /// Form label derived from the wire name (`estado_civil` -> `Estado Civil`).
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for MemberField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member record with every field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    values: BTreeMap<MemberField, String>,
}

impl Default for MemberRecord {
    fn default() -> Self {
        Self {
            values: MemberField::ALL
                .iter()
                .map(|field| (*field, String::new()))
                .collect(),
        }
    }
}

impl MemberRecord {
    /// Empty record (all fields blank)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter storing the value verbatim.
    pub fn with(mut self, field: MemberField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Internal record id, when the server assigned one
    pub fn id(&self) -> Option<i64> {
        self.get(MemberField::Id).parse().ok()
    }

    pub fn get(&self, field: MemberField) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    /// Store a value verbatim.
    pub fn set(&mut self, field: MemberField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    /// Store typed input, normalizing it by field kind.
    ///
    /// Phones and postal codes are masked as typed. Dates are converted to
    /// the canonical instant when they parse in either display convention;
    /// otherwise the text is kept so submission can reject it.
    pub fn apply_input(&mut self, field: MemberField, raw: &str) {
        let value = match field.kind() {
            FieldKind::Phone => format::normalize_phone(raw),
            FieldKind::PostalCode => format::normalize_postal_code(raw),
            FieldKind::Date => {
                let raw = raw.trim();
                to_canonical_date(raw, DateConvention::SlashText)
                    .or_else(|| to_canonical_date(raw, DateConvention::IsoPicker))
                    .map(|instant| canonical_string(&instant))
                    .unwrap_or_else(|| raw.to_string())
            }
            FieldKind::Text | FieldKind::Choice(_) => raw.to_string(),
        };
        self.set(field, value);
    }

    /// Value rendered for display; dates use the given convention.
    pub fn display(&self, field: MemberField, convention: DateConvention) -> String {
        match field.kind() {
            FieldKind::Date => format::to_display_date(self.get(field), convention),
            _ => self.get(field).to_string(),
        }
    }

    /// Date fields holding something that is neither empty nor a date.
    pub fn invalid_dates(&self) -> Vec<MemberField> {
        MemberField::ALL
            .iter()
            .copied()
            .filter(|field| field.kind() == FieldKind::Date)
            .filter(|field| !format::is_submittable_date(self.get(*field)))
            .collect()
    }

    /// Rewrite every parsable date field into the canonical instant.
    /// Empty and unparsable values are left as they are.
    pub fn canonicalize_dates(&mut self) {
        for field in MemberField::ALL {
            if field.kind() != FieldKind::Date {
                continue;
            }
            if let Some(canonical) = format::to_canonical_stored(self.get(field)) {
                self.set(field, canonical);
            }
        }
    }

    /// Iterate over `(field, value)` in form order.
    pub fn iter(&self) -> impl Iterator<Item = (MemberField, &str)> {
        MemberField::ALL.iter().map(move |field| (*field, self.get(*field)))
    }

    fn from_json_map(raw: serde_json::Map<String, Value>) -> Self {
        let mut record = Self::default();
        for (name, value) in raw {
            let Some(field) = MemberField::from_name(&name) else {
                continue;
            };
            let value = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            record.set(field, value);
        }
        record
    }
}

impl Serialize for MemberRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let id = self.id();
        let len = if id.is_some() { self.values.len() } else { self.values.len() - 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        for (field, value) in self.iter() {
            if field == MemberField::Id {
                if let Some(id) = id {
                    map.serialize_entry(field.as_str(), &id)?;
                }
                continue;
            }
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MemberRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_json_map(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_dates_rewrites_legacy_text() {
        let mut record = MemberRecord::new()
            .with(MemberField::Nascimento, "17/05/1990")
            .with(MemberField::BatismoData, "2001-09-30")
            .with(MemberField::Nome, "17/05/1990");
        record.canonicalize_dates();

        assert_eq!(record.get(MemberField::Nascimento), "1990-05-17T00:00:00.000Z");
        assert_eq!(record.get(MemberField::BatismoData), "2001-09-30T00:00:00.000Z");
        assert_eq!(record.get(MemberField::Nome), "17/05/1990");
        assert_eq!(record.get(MemberField::DataCasamento), "");
    }

    #[test]
    fn test_missing_and_null_fields_read_empty() {
        let record: MemberRecord = serde_json::from_value(json!({
            "id": 42,
            "nome": "Maria",
            "email": null,
            "campo_desconhecido": "x"
        }))
        .unwrap();

        assert_eq!(record.id(), Some(42));
        assert_eq!(record.get(MemberField::Nome), "Maria");
        assert_eq!(record.get(MemberField::Email), "");
        assert_eq!(record.get(MemberField::Oficio), "");
    }

    #[test]
    fn test_serialize_emits_every_field() {
        let value = serde_json::to_value(MemberRecord::new().with(MemberField::Nome, "João")).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), MemberField::ALL.len() - 1);
        assert!(!obj.contains_key("id"));
        assert_eq!(obj["nome"], "João");
        assert_eq!(obj["profissao_fe_igreja"], "");
    }

    #[test]
    fn test_serialize_id_as_number() {
        let value = serde_json::to_value(MemberRecord::new().with(MemberField::Id, "7")).unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_apply_input_masks_by_kind() {
        let mut record = MemberRecord::new();
        record.apply_input(MemberField::Celular, "62996415795");
        record.apply_input(MemberField::Cep, "74000000");
        record.apply_input(MemberField::Nome, "Ana");

        assert_eq!(record.get(MemberField::Celular), "(62) 99641-5795");
        assert_eq!(record.get(MemberField::Cep), "74000-000");
        assert_eq!(record.get(MemberField::Nome), "Ana");
    }

    #[test]
    fn test_apply_input_dates_become_canonical() {
        let mut record = MemberRecord::new();
        record.apply_input(MemberField::Nascimento, "17/05/1990");
        record.apply_input(MemberField::BatismoData, "2001-08-12");
        record.apply_input(MemberField::DataCasamento, "ontem");

        assert_eq!(record.get(MemberField::Nascimento), "1990-05-17T00:00:00.000Z");
        assert_eq!(record.get(MemberField::BatismoData), "2001-08-12T00:00:00.000Z");
        assert_eq!(record.invalid_dates(), vec![MemberField::DataCasamento]);
        assert_eq!(
            record.display(MemberField::Nascimento, DateConvention::SlashText),
            "17/05/1990"
        );
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in MemberField::ALL {
            assert_eq!(MemberField::from_name(field.as_str()), Some(field));
        }
        assert_eq!(MemberField::from_name("senha"), None);
    }

    #[test]
    fn test_labels_and_sections() {
        assert_eq!(MemberField::EstadoCivil.label(), "Estado Civil");
        assert_eq!(MemberField::Oficio.section(), FieldSection::Ecclesiastical);
        assert_eq!(MemberField::Cep.section().title(), "Endereço");
        assert_eq!(MemberField::Oficio.kind(), FieldKind::Choice(OFICIO_OPTIONS));
    }
}
