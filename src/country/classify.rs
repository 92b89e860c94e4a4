//! Static World Bank style classification of countries by continent,
//! regional group and income group.  Every ISO3 code lands in exactly one
//! bucket of each family; unknown codes fall back to `Others`.

use std::fmt;

const ASIA: &[&str] = &[
    "AFG", "ARM", "AZE", "BHR", "BGD", "BTN", "BRN", "MMR", "KHM", "CHN", "CXR", "CCK", "IOT", "GEO",
    "HKG", "IND", "IDN", "IRN", "IRQ", "ISR", "JPN", "JOR", "KAZ", "PRK", "KOR", "KWT", "KGZ", "LAO",
    "LBN", "MAC", "MYS", "MDV", "MNG", "OMN", "NPL", "PAK", "PSE", "PHL", "QAT", "SAU", "SGP", "LKA",
    "SYR", "TWN", "TJK", "THA", "TUR", "TKM", "ARE", "UZB", "VNM", "YEM", "TLS",
];

const SOUTH_AMERICA: &[&str] = &[
    "ARG", "BOL", "BRA", "CHL", "COL", "ECU", "GUY", "PRY", "PER", "SUR", "URY", "VEN",
];

const NORTH_AMERICA: &[&str] = &[
    "ATG", "BHS", "BRB", "BLZ", "CAN", "CRI", "CUB", "DMA", "DOM", "SLV", "GTM", "HTI", "HND", "JAM",
    "MEX", "NIC", "PAN", "KNA", "LCA", "VCT", "TTO", "USA", "ABW", "AIA", "BMU", "BES", "VGB", "CYM",
    "CUW", "GRD", "GLP", "GRL", "MTQ", "MSR", "PRI", "SPM", "TCA", "VIR",
];

const AFRICA: &[&str] = &[
    "DZA", "AGO", "BEN", "BWA", "BFA", "BDI", "CPV", "CMR", "CAF", "TCD", "COM", "COG", "COD", "DJI",
    "EGY", "GNQ", "ERI", "SWZ", "ETH", "GAB", "GMB", "GHA", "GIN", "GNB", "CIV", "KEN", "LSO", "LBR",
    "LBY", "MDG", "MWI", "MLI", "MRT", "MUS", "MAR", "MOZ", "NAM", "NER", "NGA", "RWA", "STP", "SEN",
    "SYC", "SLE", "SOM", "ZAF", "SSD", "SDN", "TZA", "TGO", "TUN", "UGA", "ZMB", "ZWE",
];

const EUROPE: &[&str] = &[
    "ALB", "AND", "AUT", "BLR", "BEL", "BIH", "BGR", "HRV", "CYP", "CZE", "DNK", "EST", "FIN", "FRA",
    "GEO", "DEU", "GRC", "HUN", "ISL", "IRL", "ITA", "KAZ", "KOS", "LVA", "LIE", "LTU", "LUX", "MKD",
    "MLT", "MDA", "MCO", "MNE", "NLD", "NOR", "POL", "PRT", "ROU", "RUS", "SMR", "SRB", "SVK", "SVN",
    "ESP", "SWE", "CHE", "UKR", "GBR", "VAT", "ALA", "FRO", "GIB", "GGY", "IMN", "JEY", "SJM",
];

const OCEANIA: &[&str] = &[
    "ASM", "AUS", "COK", "FJI", "PYF", "GUM", "KIR", "MHL", "FSM", "NRU", "NCL", "NZL", "NIU", "NFK",
    "MNP", "PLW", "PNG", "PCN", "WSM", "SLB", "TKL", "TON", "TUV", "UMI", "VUT", "WLF",
];

const LOW_INCOME: &[&str] = &[
    "AFG", "PRK", "SSD", "BFA", "LBR", "SDN", "BDI", "MDG", "SYR", "CAF", "MWI", "TGO", "TCD", "MLI",
    "UGA", "COD", "MOZ", "YEM", "ERI", "NER", "ETH", "RWA", "GMB", "SLE", "GNB", "SOM", "VEN",
];

const LOWER_MIDDLE_INCOME: &[&str] = &[
    "AGO", "JOR", "PHL", "DZA", "IND", "WSM", "BGD", "IRN", "STP", "BEN", "KEN", "SEN", "BTN", "KIR",
    "SLB", "BOL", "KGZ", "LKA", "CPV", "LAO", "TZA", "KHM", "LBN", "TJK", "CMR", "LSO", "TLS", "COM",
    "MRT", "TUN", "COG", "FSM", "UKR", "CIV", "MNG", "UZB", "DJI", "MAR", "VUT", "EGY", "MMR", "VNM",
    "SWZ", "NPL", "ZMB", "GHA", "NIC", "ZWE", "GIN", "NGA", "HTI", "PAK", "HND", "PNG",
];

const UPPER_MIDDLE_INCOME: &[&str] = &[
    "ALB", "FJI", "MKD", "ARG", "GAB", "PLW", "ARM", "GEO", "PRY", "AZE", "GRD", "PER", "BLR", "GTM",
    "RUS", "BLZ", "IDN", "SRB", "BIH", "IRQ", "ZAF", "BWA", "JAM", "LCA", "BRA", "KAZ", "VCT", "BGR",
    "XKX", "SUR", "CHN", "LBY", "THA", "COL", "MYS", "TON", "CRI", "MDV", "TUR", "CUB", "MHL", "TKM",
    "DMA", "MUS", "TUV", "DOM", "MEX", "PSE", "SLV", "MDA", "GNQ", "MNE", "ECU", "NAM", "GUY",
];

const HIGH_INCOME: &[&str] = &[
    "ASM", "DEU", "OMN", "AND", "GIB", "PAN", "ATG", "GRC", "POL", "ABW", "GRL", "PRT", "AUS", "GUM",
    "PRI", "AUT", "HKG", "QAT", "BHS", "HUN", "ROU", "BHR", "ISL", "SMR", "BRB", "IRL", "SAU", "BEL",
    "IMN", "SYC", "BMU", "ISR", "SGP", "VGB", "ITA", "SXM", "BRN", "JPN", "SVK", "CAN", "KOR", "SVN",
    "CYM", "KWT", "ESP", "JEY", "LVA", "KNA", "CHL", "LIE", "MAF", "HRV", "LTU", "SWE", "CUW", "LUX",
    "CHE", "CYP", "MAC", "TWN", "CZE", "MLT", "TTO", "DNK", "MCO", "TCA", "EST", "NRU", "ARE", "FRO",
    "NLD", "GBR", "FIN", "NCL", "USA", "FRA", "NZL", "URY", "PYF", "MNP", "VIR", "NOR",
];

const EAST_ASIA_PACIFIC: &[&str] = &[
    "ASM", "KOR", "PHL", "AUS", "LAO", "WSM", "BRN", "MAC", "SGP", "KHM", "MYS", "SLB", "CHN", "MHL",
    "TWN", "FJI", "FSM", "THA", "PYF", "MNG", "TLS", "GUM", "MMR", "PNG", "HKG", "NRU", "TON", "IDN",
    "NCL", "TUV", "JPN", "NZL", "KIR", "MNP", "VNM", "PRK", "PLW",
];

const EUROPE_CENTRAL_ASIA: &[&str] = &[
    "ALB", "GIB", "NOR", "AND", "GRC", "POL", "ARM", "GRL", "PRT", "AUT", "HUN", "ROU", "AZE", "ISL",
    "RUS", "BLR", "IRL", "SMR", "BEL", "IMN", "SRB", "BIH", "ITA", "SVK", "BGR", "KAZ", "SVN", "JEY",
    "XKX", "ESP", "HRV", "KGZ", "SWE", "CYP", "LVA", "CHE", "CZE", "LIE", "TJK", "DNK", "LTU", "TUR",
    "EST", "LUX", "TKM", "FRO", "MDA", "UKR", "FIN", "MCO", "GBR", "FRA", "MNE", "UZB", "GEO", "NLD",
    "DEU", "MKD",
];

const LATIN_AMERICA_CARIBBEAN: &[&str] = &[
    "ATG", "CUW", "PRY", "ARG", "DMA", "PER", "ABW", "DOM", "PRI", "BHS", "ECU", "SXM", "BRB", "SLV",
    "KNA", "BLZ", "GRD", "LCA", "BOL", "GTM", "MAF", "BRA", "GUY", "VGB", "HTI", "SUR", "CYM", "HND",
    "TTO", "CHL", "JAM", "TCA", "COL", "MEX", "URY", "CRI", "NIC", "VEN", "CUB", "PAN", "VIR",
];

const MIDDLE_EAST_NORTH_AFRICA: &[&str] = &[
    "DZA", "JOR", "QAT", "BHR", "KWT", "SAU", "DJI", "LBN", "SYR", "EGY", "LBY", "TUN", "IRN", "MLT",
    "ARE", "IRQ", "MAR", "PSE", "ISR", "OMN", "YEM",
];

const NORTH_AMERICA_REGION: &[&str] = &["BMU", "CAN", "USA"];

const SOUTH_ASIA: &[&str] = &["AFG", "IND", "PAK", "BGD", "MDV", "LKA", "BTN", "NPL"];

const SUB_SAHARAN_AFRICA: &[&str] = &[
    "AGO", "ETH", "NER", "BEN", "GAB", "NGA", "BWA", "GMB", "RWA", "BFA", "GHA", "STP", "BDI", "GIN",
    "SEN", "CPV", "GNB", "SYC", "CMR", "KEN", "SLE", "CAF", "LSO", "SOM", "TCD", "LBR", "ZAF", "COM",
    "MDG", "SSD", "COD", "MWI", "SDN", "COG", "MLI", "TZA", "CIV", "MRT", "TGO", "GNQ", "MUS", "UGA",
    "ERI", "MOZ", "ZMB", "SWZ", "NAM", "ZWE",
];

/// First list containing `iso3` wins.
fn lookup<T: Copy>(iso3: &str, table: &[(T, &[&str])], fallback: T) -> T {
    table.iter()
        .find(|(_, members)| members.contains(&iso3))
        .map(|(bucket, _)| *bucket)
        .unwrap_or(fallback)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Continent {
    Asia,
    Africa,
    SouthAmerica,
    NorthAmerica,
    Europe,
    Oceania,
    Others,
}

impl Continent {
    pub fn of(iso3: &str) -> Self {
        lookup(iso3, &[
            (Self::Asia, ASIA),
            (Self::Africa, AFRICA),
            (Self::SouthAmerica, SOUTH_AMERICA),
            (Self::NorthAmerica, NORTH_AMERICA),
            (Self::Europe, EUROPE),
            (Self::Oceania, OCEANIA),
        ], Self::Others)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Asia => "Asia",
            Self::Africa => "Africa",
            Self::SouthAmerica => "South America",
            Self::NorthAmerica => "North America",
            Self::Europe => "Europe",
            Self::Oceania => "Oceania",
            Self::Others => "Others",
        }
    }
}

/// World Bank regional group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionGroup {
    SubSaharanAfrica,
    EastAsiaPacific,
    EuropeCentralAsia,
    LatinAmericaCaribbean,
    MiddleEastNorthAfrica,
    NorthAmerica,
    SouthAsia,
    Others,
}

impl RegionGroup {
    pub fn of(iso3: &str) -> Self {
        lookup(iso3, &[
            (Self::SubSaharanAfrica, SUB_SAHARAN_AFRICA),
            (Self::EastAsiaPacific, EAST_ASIA_PACIFIC),
            (Self::EuropeCentralAsia, EUROPE_CENTRAL_ASIA),
            (Self::LatinAmericaCaribbean, LATIN_AMERICA_CARIBBEAN),
            (Self::MiddleEastNorthAfrica, MIDDLE_EAST_NORTH_AFRICA),
            (Self::NorthAmerica, NORTH_AMERICA_REGION),
            (Self::SouthAsia, SOUTH_ASIA),
        ], Self::Others)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SubSaharanAfrica => "SSA",
            Self::EastAsiaPacific => "EAP",
            Self::EuropeCentralAsia => "ECA",
            Self::LatinAmericaCaribbean => "LAC",
            Self::MiddleEastNorthAfrica => "MENA",
            Self::NorthAmerica => "NA",
            Self::SouthAsia => "SA",
            Self::Others => "Others",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IncomeGroup {
    Low,
    LowerMiddle,
    UpperMiddle,
    High,
    Others,
}

impl IncomeGroup {
    pub fn of(iso3: &str) -> Self {
        lookup(iso3, &[
            (Self::Low, LOW_INCOME),
            (Self::LowerMiddle, LOWER_MIDDLE_INCOME),
            (Self::UpperMiddle, UPPER_MIDDLE_INCOME),
            (Self::High, HIGH_INCOME),
        ], Self::Others)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "LIC",
            Self::LowerMiddle => "LMC",
            Self::UpperMiddle => "UMC",
            Self::High => "HIC",
            Self::Others => "Others",
        }
    }
}

macro_rules! display_label {
    ($($t:ty),*) => {$(
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
        }
    )*};
}

display_label!(Continent, RegionGroup, IncomeGroup);

/// The three buckets of one country.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub continent: Continent,
    pub region: RegionGroup,
    pub income: IncomeGroup,
}

impl Classification {
    pub fn of(iso3: &str) -> Self {
        let iso3 = iso3.trim().to_ascii_uppercase();
        Self {
            continent: Continent::of(&iso3),
            region: RegionGroup::of(&iso3),
            income: IncomeGroup::of(&iso3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_continent_wins() {
        // Listed under both Asia and Europe.
        assert_eq!(Continent::of("GEO"), Continent::Asia);
        assert_eq!(Continent::of("KAZ"), Continent::Asia);
        assert_eq!(Continent::of("RUS"), Continent::Europe);
        assert_eq!(Continent::of("KEN"), Continent::Africa);
    }

    #[test]
    fn unknown_codes_fall_back_to_others() {
        let c = Classification::of("ZZZ");
        assert_eq!((c.continent, c.region, c.income), (Continent::Others, RegionGroup::Others, IncomeGroup::Others));
    }

    #[test]
    fn known_country_gets_all_three_buckets() {
        let c = Classification::of("ken");
        assert_eq!(c.continent.to_string(), "Africa");
        assert_eq!(c.region.to_string(), "SSA");
        assert_eq!(c.income.to_string(), "LMC");
        assert_eq!(Classification::of("USA").region, RegionGroup::NorthAmerica);
        assert_eq!(Classification::of("IND").region.label(), "SA");
    }
}
