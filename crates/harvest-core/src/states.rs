use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct State {
    pub code: &'static str,
    pub name: &'static str,
}

const fn uf(code: &'static str, name: &'static str) -> State {
    State { code, name }
}

/// The 26 Brazilian states plus the Federal District.
pub const BRAZILIAN_STATES: [State; 27] = [
    uf("AC", "Acre"),
    uf("AL", "Alagoas"),
    uf("AP", "Amapá"),
    uf("AM", "Amazonas"),
    uf("BA", "Bahia"),
    uf("CE", "Ceará"),
    uf("DF", "Distrito Federal"),
    uf("ES", "Espírito Santo"),
    uf("GO", "Goiás"),
    uf("MA", "Maranhão"),
    uf("MT", "Mato Grosso"),
    uf("MS", "Mato Grosso do Sul"),
    uf("MG", "Minas Gerais"),
    uf("PA", "Pará"),
    uf("PB", "Paraíba"),
    uf("PR", "Paraná"),
    uf("PE", "Pernambuco"),
    uf("PI", "Piauí"),
    uf("RJ", "Rio de Janeiro"),
    uf("RN", "Rio Grande do Norte"),
    uf("RS", "Rio Grande do Sul"),
    uf("RO", "Rondônia"),
    uf("RR", "Roraima"),
    uf("SC", "Santa Catarina"),
    uf("SP", "São Paulo"),
    uf("SE", "Sergipe"),
    uf("TO", "Tocantins"),
];
